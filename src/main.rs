use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use course_path_generator::store::StorageBackend;
use course_path_generator::{Config, GenerationRequest, PipelineOrchestrator};

fn cli() -> Command {
    Command::new("course-path")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate AI-curated learning paths from YouTube content")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to the standard search paths)")
                .global(true),
        )
        .subcommand(
            Command::new("generate")
                .about("Run one generation in the foreground")
                .arg(
                    Arg::new("subject")
                        .short('s')
                        .long("subject")
                        .value_name("TEXT")
                        .help("Subject to build a course for")
                        .required(true),
                )
                .arg(
                    Arg::new("difficulty")
                        .short('d')
                        .long("difficulty")
                        .value_name("LEVEL")
                        .help("beginner, intermediate or advanced")
                        .default_value("beginner"),
                )
                .arg(
                    Arg::new("user")
                        .short('u')
                        .long("user")
                        .value_name("ID")
                        .help("Requesting user to link the course to"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Write the assembled course as JSON"),
                )
                .arg(
                    Arg::new("memory-store")
                        .long("memory-store")
                        .help("Keep documents in memory instead of MongoDB")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("serve").about("Start the HTTP trigger API"))
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    match matches.get_one::<String>("config") {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env();
            Ok(config)
        }
        None => Config::load(),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("course_path_generator={},course_path={},warn", level, level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let mut config = load_config(&matches)?;
    init_logging(&config.logging.level);

    match matches.subcommand() {
        Some(("generate", args)) => {
            if args.get_flag("memory-store") {
                config.storage.backend = StorageBackend::Memory;
            }
            config.validate()?;
            generate(&config, args).await
        }
        Some(("serve", _)) => {
            config.validate()?;
            serve(config).await
        }
        Some(("config", _)) => {
            println!("{}", config.summary());
            Ok(())
        }
        _ => Err(anyhow!("unknown command")),
    }
}

async fn generate(config: &Config, args: &ArgMatches) -> Result<()> {
    let subject = args.get_one::<String>("subject").map(String::as_str).unwrap_or_default();
    let difficulty = args.get_one::<String>("difficulty").map(String::as_str).unwrap_or("beginner");
    let user = args.get_one::<String>("user").map(String::as_str);

    let request = GenerationRequest::new(subject, difficulty, user)?;
    let orchestrator = PipelineOrchestrator::from_config(config)?;

    info!("🚀 Course Path Generator starting...");
    info!("🆔 Correlation id: {}", request.correlation_id);

    let report = orchestrator.run(&request).await;

    if let Some(course) = &report.course {
        info!("📘 {}", course.course_path.title);
        for (position, topic) in course.topics.iter().enumerate() {
            info!(
                "  {}. {} ({} {}s-{}s)",
                position + 1,
                topic.name,
                topic.video_info.youtube_url,
                topic.video_info.start_time_sec,
                topic.video_info.end_time_sec
            );
        }
        for skipped in &course.skipped {
            warn!("  ⏭️ {} skipped ({:?})", skipped.name, skipped.reason);
        }

        if let Some(path) = args.get_one::<String>("output").map(PathBuf::from) {
            let json = serde_json::to_string_pretty(course)?;
            tokio::fs::write(&path, json).await?;
            info!("📝 Course written to {}", path.display());
        }
    }

    info!("⏱️ Finished in {:.2}s", report.elapsed.as_secs_f64());

    match report.error {
        Some(err) => {
            error!("❌ Run ended in {:?}", report.state);
            Err(err.into())
        }
        None => {
            info!("✅ Course {} persisted", report.course_path_id.map(|id| id.to_string()).unwrap_or_default());
            Ok(())
        }
    }
}

#[cfg(feature = "api")]
async fn serve(config: Config) -> Result<()> {
    use course_path_generator::api::ApiServer;
    use std::sync::Arc;
    use course_path_generator::CourseJobLauncher;

    let orchestrator = Arc::new(PipelineOrchestrator::from_config(&config)?);
    let launcher = CourseJobLauncher::new(orchestrator);
    ApiServer::new(launcher, Arc::new(config)).start().await
}

#[cfg(not(feature = "api"))]
async fn serve(_config: Config) -> Result<()> {
    Err(anyhow!("this binary was built without the `api` feature"))
}
