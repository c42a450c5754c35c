use log::{info, warn};
use snafu::{prelude::*, Snafu};

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::SystemTime;

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

use dashboard_core::aggregator::{self, LiveFeed, Poller, ResultsBoard};
use dashboard_core::counter::{animate, AnimatedCounter, FRAME_PERIOD};
use dashboard_core::progress::{ProgressSink, SyntheticProgress};
use dashboard_core::ticker::Ticker;
use dashboard_core::wizard::{Notice, Wizard};
use dashboard_core::*;

use crate::api::{DatasetKind, HttpApi};
use crate::args::{Args, Command};
use crate::config::*;
use crate::render::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Error reading file {path}"))]
    ReadingFile { source: io::Error, path: String },
    #[snafu(display("Error writing file {path}"))]
    WritingFile { source: io::Error, path: String },
    #[snafu(display("Error parsing settings file {path}"))]
    ParsingSettings {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Request to the backend failed"))]
    Api { source: DashboardError },
    #[snafu(display("Error formatting the current time"))]
    FormattingTime { source: time::error::Format },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, CliError>;

pub fn run(args: &Args) -> CliResult<()> {
    let file = match &args.config {
        Some(path) => read_settings_file(path)?,
        None => SettingsFile::default(),
    };
    let env_api_url = std::env::var(API_URL_ENV).ok();
    let settings = resolve(args.api_url.as_deref(), &file, env_api_url.as_deref());
    info!("settings: {:?}", settings);
    let api = HttpApi::new(&settings.api_url, settings.timeout);

    match &args.command {
        Command::Datasets { delete } => {
            if let Some(id) = delete {
                api.delete_dataset(id).context(ApiSnafu {})?;
                println!("Deleted dataset {}", id);
            }
            let entries = api.list_datasets().context(ApiSnafu {})?;
            println!("{}", render_datasets("Original datasets", &entries));
        }
        Command::Cleaned { delete } => {
            if let Some(id) = delete {
                api.delete_cleaned_dataset(id).context(ApiSnafu {})?;
                println!("Deleted cleaned dataset {}", id);
            }
            let entries = api.list_cleaned_datasets().context(ApiSnafu {})?;
            println!("{}", render_datasets("Cleaned datasets", &entries));
        }
        Command::Download { kind, id, out } => download(&api, *kind, id, out.as_deref())?,
        Command::Operations => println!("{}", render_operations()),
        Command::Analyze { file, operations } => analyze(&api, &settings, file, operations)?,
        Command::Results {
            watch,
            region,
            cycles,
        } => {
            if *watch {
                watch_results(api, &settings, region.as_deref(), *cycles)?
            } else {
                show_results(&api, region.as_deref())
            }
        }
    }
    Ok(())
}

fn download(api: &HttpApi, kind: DatasetKind, id: &str, out: Option<&str>) -> CliResult<()> {
    let default_path = match kind {
        DatasetKind::Original => format!("original_{}.csv", id),
        DatasetKind::Cleaned => format!("cleaned_{}.csv", id),
    };
    let path = out.unwrap_or(default_path.as_str());
    let bytes = api.download_dataset(kind, id).context(ApiSnafu {})?;
    fs::write(path, &bytes).context(WritingFileSnafu { path })?;
    println!("Wrote {} bytes to {}", format_count(bytes.len() as u64), path);
    Ok(())
}

fn now_rfc3339() -> CliResult<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context(FormattingTimeSnafu {})
}

fn update_label(at: Option<SystemTime>) -> String {
    match at {
        Some(t) => OffsetDateTime::from(t)
            .format(&format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
            ))
            .unwrap_or_else(|_| "-".to_string()),
        None => "-".to_string(),
    }
}

// ********* The analysis workflow ***********

fn analyze(
    api: &HttpApi,
    settings: &Settings,
    path: &str,
    operations: &[String],
) -> CliResult<()> {
    for op in operations {
        if !CLEANING_OPERATIONS.iter().any(|o| o.name == op) {
            whatever!(
                "Unknown cleaning operation {:?}. See the operations command.",
                op
            )
        }
    }

    let contents = fs::read(path).context(ReadingFileSnafu { path })?;
    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string();
    let request = UploadRequest {
        file_name,
        contents,
        submitted_at: now_rfc3339()?,
    };

    let mut wizard = Wizard::new(settings.progress_tick);

    let uploaded = wizard.upload(api, &request).context(ApiSnafu {})?;
    println!("{}", render_upload(uploaded));
    wizard.advance(api).context(ApiSnafu {})?;

    for op in operations {
        if !wizard.selected_operations().contains(op) {
            wizard.toggle_operation(op);
        }
    }
    wizard.clean(api).context(ApiSnafu {})?;
    println!("{}\n", render_summary(wizard.summary()));
    wizard.advance(api).context(ApiSnafu {})?;

    let sink: Arc<dyn ProgressSink> = Arc::new(|p: SyntheticProgress| {
        eprint!("\r{}", progress_line(p));
        let _ = io::stderr().flush();
    });
    let trained = wizard.train(api, sink);
    eprintln!();
    let metrics = trained.context(ApiSnafu {})?;
    println!("{}\n", render_metrics(&metrics));

    wizard.advance(api).context(ApiSnafu {})?;
    if let Some(Notice::Warning(message)) = wizard.notice() {
        warn!("{}", message);
    }
    if let Some(view) = wizard.results() {
        println!("{}", render_results(view));
    }
    Ok(())
}

// ********* Live results ***********

fn show_results(api: &HttpApi, region: Option<&str>) {
    let board = Mutex::new(ResultsBoard::default());
    aggregator::refresh(&board, api);
    let mut board = board.into_inner().unwrap_or_else(|p| p.into_inner());
    if let Some(r) = region {
        board.select_region(r);
    }
    println!("{}", render_board(&board, &update_label(board.last_update())));
}

fn print_votes(value: i64) {
    print!("\rVotes cast: {}", format_count(value.max(0) as u64));
    let _ = io::stdout().flush();
}

fn watch_results(
    api: HttpApi,
    settings: &Settings,
    region: Option<&str>,
    cycles: Option<usize>,
) -> CliResult<()> {
    let board = Arc::new(Mutex::new(ResultsBoard::default()));
    if let Some(r) = region {
        board
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .select_region(r);
    }
    let counter = Arc::new(Mutex::new(AnimatedCounter::new(
        0,
        settings.counter_duration,
    )));
    let feed: Arc<dyn LiveFeed> = Arc::new(api);
    let (tx, rx) = mpsc::channel::<()>();

    let poller = {
        let counter = counter.clone();
        let frames: Mutex<Option<Ticker>> = Mutex::new(None);
        Poller::start(board, feed, settings.refresh_interval, move |b| {
            println!("\n{}", render_board(b, &update_label(b.last_update())));
            let mut slot = frames.lock().unwrap_or_else(|p| p.into_inner());
            // The previous driver stops before the target moves.
            drop(slot.take());
            if let Ok(mut c) = counter.lock() {
                c.set_target(b.total_votes().min(i64::MAX as u64) as i64);
            }
            *slot = Some(animate(counter.clone(), FRAME_PERIOD, print_votes));
            let _ = tx.send(());
        })
    };

    let mut refreshes = 0usize;
    for () in rx.iter() {
        refreshes += 1;
        if cycles.map(|n| refreshes >= n).unwrap_or(false) {
            break;
        }
    }
    while counter.lock().map(|c| c.is_animating()).unwrap_or(false) {
        thread::sleep(FRAME_PERIOD);
    }
    poller.stop();
    println!();
    Ok(())
}
