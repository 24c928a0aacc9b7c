//! ``src/nav/commands.rs``
//!
//! Front-end command names this namespace recognises. Navigation commands
//! are served; mutation commands are always rejected.

use std::{fmt, str::FromStr};

use crate::{
    error::{CoreResult, TreeError},
    util::path::fold_case,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Navigation
    SetLocation,
    GetLocation,
    PopLocation,
    PushLocation,
    GetChildItem,
    ResolvePath,
    GetItem,
    TestPath,
    GetContent,
    SetContent,

    // Mutation
    ClearContent,
    MoveItem,
    CopyItem,
    NewItem,
    RemoveItem,
    RenameItem,
    ClearItem,
    SetItem,
    InvokeItem,
}

impl Command {
    pub const ALL: [Self; 19] = [
        Self::SetLocation,
        Self::GetLocation,
        Self::PopLocation,
        Self::PushLocation,
        Self::GetChildItem,
        Self::ResolvePath,
        Self::GetItem,
        Self::TestPath,
        Self::GetContent,
        Self::SetContent,
        Self::ClearContent,
        Self::MoveItem,
        Self::CopyItem,
        Self::NewItem,
        Self::RemoveItem,
        Self::RenameItem,
        Self::ClearItem,
        Self::SetItem,
        Self::InvokeItem,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SetLocation => "Set-Location",
            Self::GetLocation => "Get-Location",
            Self::PopLocation => "Pop-Location",
            Self::PushLocation => "Push-Location",
            Self::GetChildItem => "Get-ChildItem",
            Self::ResolvePath => "Resolve-Path",
            Self::GetItem => "Get-Item",
            Self::TestPath => "Test-Path",
            Self::GetContent => "Get-Content",
            Self::SetContent => "Set-Content",
            Self::ClearContent => "Clear-Content",
            Self::MoveItem => "Move-Item",
            Self::CopyItem => "Copy-Item",
            Self::NewItem => "New-Item",
            Self::RemoveItem => "Remove-Item",
            Self::RenameItem => "Rename-Item",
            Self::ClearItem => "Clear-Item",
            Self::SetItem => "Set-Item",
            Self::InvokeItem => "Invoke-Item",
        }
    }

    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::ClearContent
                | Self::MoveItem
                | Self::CopyItem
                | Self::NewItem
                | Self::RemoveItem
                | Self::RenameItem
                | Self::ClearItem
                | Self::SetItem
                | Self::InvokeItem
        )
    }

    #[must_use]
    pub const fn is_navigation(self) -> bool {
        !self.is_mutation()
    }

    /// Case-insensitive lookup; the dash is optional.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let wanted = fold_case(&name.trim().replace('-', ""));

        Self::ALL
            .into_iter()
            .find(|command| fold_case(&command.name().replace('-', "")) == wanted)
    }

    /// Fails with `NotSupported` for mutation commands.
    pub fn ensure_supported(self, path: &str) -> CoreResult<()> {
        if self.is_mutation() {
            return Err(TreeError::not_supported(self.name(), path).trace());
        }

        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| TreeError::not_supported(s, ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_case_and_dash() {
        assert_eq!(Command::parse("get-childitem"), Some(Command::GetChildItem));
        assert_eq!(Command::parse("GETCHILDITEM"), Some(Command::GetChildItem));
        assert_eq!(Command::parse("Remove-Item"), Some(Command::RemoveItem));
        assert_eq!(Command::parse("Format-Table"), None);
    }

    #[test]
    fn test_mutations_rejected_with_path() {
        let err = Command::MoveItem.ensure_supported("Tree:/Erin").unwrap_err();

        assert!(matches!(err, TreeError::NotSupported { .. }));
        assert!(err.to_string().contains("Move-Item"));
        assert!(Command::TestPath.ensure_supported("Tree:/Erin").is_ok());
    }

    #[test]
    fn test_partition_is_ten_navigation_nine_mutation() {
        let navigation = Command::ALL.iter().filter(|c| c.is_navigation()).count();
        assert_eq!(navigation, 10);
        assert_eq!(Command::ALL.len() - navigation, 9);
    }
}
