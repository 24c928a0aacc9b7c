//! src/main.rs
//! Demo front-end: mounts the sample family tree and runs one command on it.
//!
//! ```text
//! lazytree [COMMAND] [PATH] [--force] [--recurse] [--filter F] [--value TEXT]
//! lazytree get-childitem FamilyTree:/Erin
//! lazytree get-content FamilyTree:/Ethen
//! ```

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::signal;
use tracing::{info, warn};

use lazytree_core::{
    Logger,
    config::Config,
    mount::NavTree,
    nav::{Command, ItemInfo, OperationContext, Session},
    samples::family_tree,
};

const DRIVE: &str = "FamilyTree";

#[derive(Debug, Default)]
struct Args {
    command: String,
    path: String,
    force: bool,
    recurse: bool,
    filter: Option<String>,
    value: Option<String>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Self::default();
        let mut positional: Vec<String> = Vec::new();
        let mut iter = std::env::args().skip(1);

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--force" => args.force = true,
                "--recurse" => args.recurse = true,
                "--filter" => args.filter = Some(iter.next().context("--filter needs a value")?),
                "--value" => args.value = Some(iter.next().context("--value needs a value")?),
                flag if flag.starts_with("--") => bail!("unknown flag '{flag}'"),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        args.command = positional.next().unwrap_or_else(|| "get-childitem".to_owned());
        args.path = positional.next().unwrap_or_else(|| format!("{DRIVE}:/"));
        Ok(args)
    }

    fn context(&self) -> OperationContext {
        let ctx = OperationContext::new(&self.command, &self.path)
            .force(self.force)
            .recurse(self.recurse);

        match &self.filter {
            Some(filter) => ctx.with_filter(filter),
            None => ctx,
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let args = Args::parse().context("Invalid arguments")?;

    let config: Config = Config::load().await.unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        Config::default()
    });

    Logger::init_tracing(&config.logging).context("Failed to initialize logging")?;
    info!(marker = "APP_START", operation_type = "startup", "Starting lazytree demo");

    let tree: Arc<NavTree> = NavTree::mount(
        DRIVE,
        &format!("{}#{}", family_tree::MODULE_NAME, family_tree::ROOT_TYPE),
        &family_tree::registry(),
        config,
    )
    .context("Failed to mount the family tree")?;

    let session = Session::new(tree);
    let ctx: OperationContext = args.context();

    let stop = ctx.stop_token().clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    run(&session, &ctx, &args).await?;

    for diagnostic in ctx.take_diagnostics() {
        warn!(
            marker = "APP_DIAGNOSTIC",
            operation_type = "report",
            id = %diagnostic.id,
            node = %diagnostic.target,
            "{}",
            diagnostic.message
        );
        eprintln!("{:?} {}: {}", diagnostic.level, diagnostic.target, diagnostic.message);
    }

    info!(marker = "APP_EXIT", operation_type = "shutdown", "Exited cleanly");
    Ok(())
}

async fn run(session: &Session, ctx: &OperationContext, args: &Args) -> Result<()> {
    let Some(command) = ctx.command() else {
        bail!("'{}' is not a command this namespace understands", ctx.command_name());
    };

    session.reject_unsupported(ctx)?;

    match command {
        Command::TestPath => println!("{}", session.exists(ctx).await),

        Command::GetItem | Command::GetLocation | Command::SetLocation | Command::ResolvePath => {
            println!("{}", session.get_item(ctx).await?);
        }

        Command::GetChildItem => {
            for child in session.list_children(ctx).await? {
                println!("{}", ItemInfo::from(&child));
            }
        }

        Command::GetContent => match session.get_content(ctx).await? {
            Some(lines) => lines.iter().for_each(|line| println!("{line}")),
            None => println!("(no content)"),
        },

        Command::SetContent => {
            let value: String = args.value.clone().context("set-content needs --value")?;
            for node in session.set_content(ctx, value).await? {
                println!("{}", ItemInfo::from(&node));
            }
        }

        other => bail!("'{other}' has no demo front-end"),
    }

    Ok(())
}
