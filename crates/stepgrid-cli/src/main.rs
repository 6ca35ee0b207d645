//! stepctl — drive cluster and step lifecycles from the command line.
//!
//! ```text
//! stepctl init --log-uri s3://logs/ --key-name ops-key
//! stepctl run --name nightly --resize-core 1 --artifact s3://jobs/join.jar --terminate
//! stepctl step wait --cluster j-1ABC s-2DEF
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ClusterArgs, Context, OutputFormat, PollArgs, StepOptions};

#[derive(Parser)]
#[command(
    name = "stepctl",
    about = "StepGrid — cluster and step lifecycle orchestrator",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Config file (default: ./stepgrid.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Control plane endpoint, overriding the config file
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a stepgrid.toml scaffold
    Init {
        #[arg(short, long, default_value = ".")]
        path: String,
        /// Where clusters write their logs (s3://...)
        #[arg(long)]
        log_uri: String,
        /// Key pair for SSH access to cluster nodes
        #[arg(long)]
        key_name: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Create, inspect, resize and terminate clusters
    Cluster {
        #[command(subcommand)]
        action: ClusterAction,
    },
    /// Submit steps and wait for them
    Step {
        #[command(subcommand)]
        action: StepAction,
    },
    /// Full pipeline: create or reuse a cluster, optionally resize its
    /// CORE group, run the steps in order, optionally terminate.
    Run {
        /// Reuse this cluster instead of creating one
        #[arg(long, conflicts_with = "name")]
        cluster: Option<String>,
        #[command(flatten)]
        create: ClusterArgs,
        /// Step artifact; repeat for several steps, run in order
        #[arg(long = "artifact", required = true)]
        artifacts: Vec<String>,
        #[command(flatten)]
        options: StepOptions,
        /// Resize the CORE group to this many nodes before submitting
        #[arg(long)]
        resize_core: Option<u32>,
        /// Run the whole step list this many times
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
        repeat: u32,
        /// Terminate the cluster once every step has finished
        #[arg(long)]
        terminate: bool,
        #[command(flatten)]
        poll: PollArgs,
    },
    /// Browse the artifact store
    Artifacts {
        #[command(subcommand)]
        action: ArtifactsAction,
    },
}

#[derive(Subcommand)]
enum ClusterAction {
    /// Create a cluster with one MASTER node and N CORE nodes
    Create {
        #[command(flatten)]
        args: ClusterArgs,
    },
    /// Show state, master DNS, applications and log URI
    Describe { cluster_id: String },
    /// List instance groups
    Groups { cluster_id: String },
    /// Resize an instance group (the CORE group unless --group is given)
    Resize {
        cluster_id: String,
        /// New node count
        #[arg(long)]
        count: u32,
        /// Instance group id
        #[arg(long)]
        group: Option<String>,
    },
    /// Terminate a cluster
    Terminate { cluster_id: String },
}

#[derive(Subcommand)]
enum StepAction {
    /// Submit one step
    Submit {
        #[arg(long)]
        cluster: String,
        /// Artifact location (s3://bucket/key, https://..., file:///...)
        #[arg(long)]
        artifact: String,
        #[command(flatten)]
        options: StepOptions,
        /// Poll until the step finishes
        #[arg(long)]
        wait: bool,
        #[command(flatten)]
        poll: PollArgs,
    },
    /// Poll a submitted step until it finishes
    Wait {
        #[arg(long)]
        cluster: String,
        step_id: String,
        #[command(flatten)]
        poll: PollArgs,
    },
}

#[derive(Subcommand)]
enum ArtifactsAction {
    /// List objects under s3://bucket[/prefix]
    List { location: String },
}

fn init_tracing(verbose: bool, format: LogFormat) -> anyhow::Result<()> {
    let default = if verbose {
        "stepctl=debug,stepgrid=debug"
    } else {
        "stepctl=info,stepgrid=info"
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format)?;

    let ctx = Context::load(cli.config.as_deref(), cli.endpoint, cli.format)?;

    match cli.command {
        Commands::Init {
            path,
            log_uri,
            key_name,
            force,
        } => commands::init::init(
            &path,
            &ctx.config.control_plane.endpoint,
            &log_uri,
            &key_name,
            force,
        ),
        Commands::Cluster { action } => match action {
            ClusterAction::Create { args } => commands::cluster::create(&ctx, &args).await,
            ClusterAction::Describe { cluster_id } => {
                commands::cluster::describe(&ctx, &cluster_id).await
            }
            ClusterAction::Groups { cluster_id } => {
                commands::cluster::groups(&ctx, &cluster_id).await
            }
            ClusterAction::Resize {
                cluster_id,
                count,
                group,
            } => commands::cluster::resize(&ctx, &cluster_id, group.as_deref(), count).await,
            ClusterAction::Terminate { cluster_id } => {
                commands::cluster::terminate(&ctx, &cluster_id).await
            }
        },
        Commands::Step { action } => match action {
            StepAction::Submit {
                cluster,
                artifact,
                options,
                wait,
                poll,
            } => commands::step::submit(&ctx, &cluster, &artifact, &options, wait, &poll).await,
            StepAction::Wait {
                cluster,
                step_id,
                poll,
            } => commands::step::wait(&ctx, &cluster, &step_id, &poll).await,
        },
        Commands::Run {
            cluster,
            create,
            artifacts,
            options,
            resize_core,
            repeat,
            terminate,
            poll,
        } => {
            let request = commands::run::RunRequest {
                cluster_id: cluster.as_deref(),
                create: &create,
                artifacts: &artifacts,
                options: &options,
                resize_core,
                repeat,
                terminate,
                poll: &poll,
            };
            commands::run::run(&ctx, &request).await
        }
        Commands::Artifacts { action } => match action {
            ArtifactsAction::List { location } => commands::artifacts::list(&ctx, &location).await,
        },
    }
}
