use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scriptgen::api::{
    ApiClient, ApiError, Artifact, AuthContext, ExportFormat, JobHandle, JobService, ScriptQuery,
};
use scriptgen::cli::{Cli, Commands, OutputFormat};
use scriptgen::config::Config;
use scriptgen::workflow::{GenerationController, Notice, NoticeKind, Snapshot, WorkflowState};
use scriptgen::{output, utils, validator, GenerationError};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so transcripts on stdout stay clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_filter().into());
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let logging_in = matches!(cli.command, Commands::Login { .. });
    let result = run(cli).await;

    if let (Err(err), false) = (&result, logging_in) {
        let expired = matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized { .. }))
            || matches!(
                err.downcast_ref::<GenerationError>(),
                Some(GenerationError::SessionExpired)
            );
        if expired {
            eprintln!("{} Run `scriptgen login` to sign in again.", style("→").yellow());
        }
    }

    result
}

async fn run(cli: Cli) -> Result<()> {
    // Link shape is checked before any config or network access
    if let Commands::Generate { url, .. } = &cli.command {
        if !validator::is_valid_video_url(url.trim()) {
            return Err(GenerationError::InvalidUrl(url.clone()).into());
        }
    }

    let config = Config::load(cli.config.as_deref())
        .await?
        .with_base_url(cli.api_url.clone())?;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Generate {
            url,
            output,
            format,
            download,
            interval_ms,
            max_wait,
        } => {
            let client = connect(&config)?;

            let mut policy = config.poll_policy();
            if let Some(ms) = interval_ms {
                policy.interval = Duration::from_millis(ms);
            }
            if let Some(secs) = max_wait {
                policy.max_duration = Some(Duration::from_secs(secs));
            }

            let controller = GenerationController::new(Arc::new(client.clone()), policy);
            let handle = controller.submit(&url).await?;
            tracing::info!(task_id = %handle.task_id, "Transcription started");

            let artifact = settle(follow(&controller, quiet).await?)?;
            emit(&artifact, output.as_deref(), format).await?;

            if let Some(export) = download {
                download_script(&client, &config, &artifact.id, export, None, quiet).await?;
            }
        }
        Commands::Watch {
            task_id,
            script_id,
            url,
            output,
            format,
        } => {
            let client = connect(&config)?;
            let mut handle = JobHandle::new(task_id);
            if let Some(id) = script_id {
                handle = handle.with_script_id(id);
            }

            let controller = GenerationController::new(Arc::new(client), config.poll_policy());
            controller.attach(handle, url.unwrap_or_default())?;

            let artifact = settle(follow(&controller, quiet).await?)?;
            emit(&artifact, output.as_deref(), format).await?;
        }
        Commands::Status { task_id } => {
            let client = connect(&config)?;
            let result = client.poll_status(&task_id).await?;
            let update = result.update();

            println!("Status: {} ({}%)", result.status(), update.progress);
            if !update.message.is_empty() {
                println!("Message: {}", update.message);
            }
            if let Some(id) = &update.script_id {
                println!("Script ID: {}", id);
            }
        }
        Commands::List {
            page,
            limit,
            search,
            status,
            format,
        } => {
            let client = connect(&config)?;
            let query = ScriptQuery {
                page,
                per_page: limit,
                search,
                status,
            };
            let scripts = client.list_scripts(&query).await?;

            match format {
                OutputFormat::Text => println!("{}", output::format_script_list(&scripts)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&scripts)?),
            }
        }
        Commands::Show {
            script_id,
            output,
            format,
        } => {
            let client = connect(&config)?;
            let artifact = client.fetch_artifact(&script_id).await?;
            emit(&artifact, output.as_deref(), format).await?;
        }
        Commands::Download {
            script_id,
            format,
            output,
        } => {
            let client = connect(&config)?;
            let format = format.unwrap_or(config.app.default_export_format);
            download_script(&client, &config, &script_id, format, output.as_deref(), quiet).await?;
        }
        Commands::Regenerate { script_id } => {
            let client = connect(&config)?;
            let video_url = match client.fetch_artifact(&script_id).await {
                Ok(previous) => previous.video_url,
                Err(err) => {
                    tracing::debug!(%script_id, "Could not read the existing script: {}", err);
                    String::new()
                }
            };

            let handle = client.regenerate(&script_id).await?;
            println!("Script {} queued for regeneration (task {})", script_id, handle.task_id);

            let controller = GenerationController::new(Arc::new(client), config.poll_policy());
            controller.attach(handle, video_url)?;

            let artifact = settle(follow(&controller, quiet).await?)?;
            emit(&artifact, None, OutputFormat::Text).await?;
        }
        Commands::Login { email, password } => {
            let client = client_for(&config)?;
            client.login(&email, &password).await?;
            match client.auth().path() {
                Some(path) => println!("Logged in. Token stored at {}", path.display()),
                None => println!("Logged in."),
            }
        }
        Commands::Logout => {
            let auth = AuthContext::load(config.token_path()?)?;
            auth.clear();
            println!("Logged out.");
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Edit it to change the API URL, polling policy and download defaults.");
            }
        }
    }

    Ok(())
}

fn connect(config: &Config) -> Result<ApiClient> {
    let client = client_for(config)?;
    if !client.auth().is_authenticated() {
        tracing::warn!("No stored access token; run `scriptgen login` if the service requires one");
    }
    Ok(client)
}

fn client_for(config: &Config) -> Result<ApiClient> {
    let auth = Arc::new(AuthContext::load(config.token_path()?)?);
    let client = ApiClient::new(&config.api.base_url, config.request_timeout(), auth)
        .context("Failed to create HTTP client")?;
    Ok(client)
}

/// Show live progress until the controller settles; Ctrl-C resets it.
async fn follow(controller: &GenerationController, quiet: bool) -> Result<Snapshot> {
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(120));

    let mut updates = controller.subscribe();
    let mut notices = controller.notices();

    loop {
        let snapshot = updates.borrow_and_update().clone();
        progress.set_position(u64::from(snapshot.progress));
        progress.set_message(snapshot.message.clone());

        if snapshot.is_settled() || snapshot.state == WorkflowState::Idle {
            progress.finish_and_clear();
            while let Ok(notice) = notices.try_recv() {
                print_notice(&progress, &notice, quiet);
            }
            return Ok(snapshot);
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    progress.finish_and_clear();
                    return Ok(controller.snapshot());
                }
            }
            notice = notices.recv() => {
                if let Ok(notice) = notice {
                    print_notice(&progress, &notice, quiet);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.reset();
                progress.abandon_with_message("Cancelled");
                anyhow::bail!("Cancelled by user");
            }
        }
    }
}

fn print_notice(progress: &ProgressBar, notice: &Notice, quiet: bool) {
    let line = match notice.kind {
        NoticeKind::Success if quiet => return,
        NoticeKind::Success => format!("{} {}", style("✔").green(), notice.text),
        NoticeKind::Error => format!("{} {}", style("✖").red(), notice.text),
    };
    progress.suspend(|| eprintln!("{}", line));
}

/// Turn a settled snapshot into the script, or the reason there is none
fn settle(snapshot: Snapshot) -> Result<Artifact> {
    match snapshot.state {
        WorkflowState::Completed => {
            if snapshot.fetch_error.is_some() {
                if let Some(job) = &snapshot.job {
                    eprintln!(
                        "{} The script is not available yet; try `scriptgen show {}` later.",
                        style("!").yellow(),
                        job.script_id.as_deref().unwrap_or("<id>")
                    );
                }
            }
            snapshot
                .artifact
                .context("Generation completed without a script")
        }
        WorkflowState::Failed => Err(snapshot
            .failure
            .unwrap_or(GenerationError::JobFailed(snapshot.message))
            .into()),
        WorkflowState::Idle | WorkflowState::Processing => Err(GenerationError::Cancelled.into()),
    }
}

async fn emit(artifact: &Artifact, path: Option<&Path>, format: OutputFormat) -> Result<()> {
    match path {
        Some(path) => {
            output::save_to_file(artifact, path, format).await?;
            println!("Script saved to: {}", path.display());
        }
        None => output::print_to_console(artifact, format)?,
    }
    Ok(())
}

async fn download_script(
    client: &ApiClient,
    config: &Config,
    script_id: &str,
    format: ExportFormat,
    target: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?,
    );
    progress.set_message("Downloading script...");

    let download = client.download(script_id, format, &progress).await?;
    progress.finish_and_clear();

    let target = target.or(config.app.download_dir.as_deref());
    let path = output::write_download(&download, target)?;

    println!(
        "Downloaded {} to {}",
        utils::format_file_size(download.bytes.len() as u64),
        path.display()
    );
    Ok(())
}
