use std::sync::Arc;
use std::time::Duration;

use neo_alexandria_lib::api::{ApiClient, AuthListener, AuthSession};
use neo_alexandria_lib::config::AppConfig;
use neo_alexandria_lib::poller::{
    PollError, PollObserver, ResourceListCache, ResourcePoller, TerminalStateHook,
};
use neo_alexandria_lib::resources::{
    CreateResource, IngestionStatus, ResourceListQuery, ResourceStatusSnapshot,
};

#[derive(Debug, Default)]
struct Options {
    url: Option<String>,
    id: Option<String>,
    title: Option<String>,
    base_url: Option<String>,
    interval: Option<Duration>,
}

/// Prints every status change. Repeated identical snapshots stay quiet.
#[derive(Default)]
struct ConsoleObserver {
    last: std::sync::Mutex<Option<IngestionStatus>>,
}

impl PollObserver for ConsoleObserver {
    fn on_status(&self, snapshot: &ResourceStatusSnapshot) {
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *last != Some(snapshot.ingestion_status) {
            println!("{}  {}", snapshot.id, snapshot.ingestion_status);
            *last = Some(snapshot.ingestion_status);
        }
    }

    fn on_completed(&self, snapshot: &ResourceStatusSnapshot) {
        let finished = snapshot.ingestion_completed_at.as_deref().unwrap_or("-");
        println!("{}  ingestion finished at {finished}", snapshot.id);
    }

    fn on_failed(&self, snapshot: &ResourceStatusSnapshot, message: &str) {
        eprintln!("{}  ingestion failed: {message}", snapshot.id);
    }

    fn on_error(&self, error: &PollError) {
        eprintln!("polling stopped: {error}");
    }
}

struct ExpiredSession;

impl AuthListener for ExpiredSession {
    fn on_session_expired(&self) {
        eprintln!("session expired; set NEO_ALEXANDRIA_API_TOKEN and sign in again");
    }
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("watch-ingestion failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let Some(options) = parse_args()? else {
        print_help();
        return Ok(());
    };

    let mut config = AppConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(base_url) = options.base_url {
        config.api.base_url = base_url;
    }
    let interval = options.interval.unwrap_or_else(|| config.poll_interval());

    let session = AuthSession::new(config.auth_tokens()).with_listener(Arc::new(ExpiredSession));
    let client = ApiClient::new(config.api.clone(), Arc::new(session)).map_err(|e| e.to_string())?;

    let id = match (options.id, options.url) {
        (Some(id), _) => id,
        (None, Some(url)) => {
            let accepted = client
                .create_resource(&CreateResource {
                    title: options.title,
                    url: Some(url),
                    content: None,
                })
                .await
                .map_err(|e| e.to_string())?;
            println!("{}  {}", accepted.id, accepted.message);
            accepted.id
        }
        (None, None) => return Err("a URL or --id is required (see --help)".to_string()),
    };

    let cache = Arc::new(ResourceListCache::new());
    let poller = ResourcePoller::new(
        Arc::new(client.clone()),
        Arc::new(ConsoleObserver::default()),
        cache.clone() as Arc<dyn TerminalStateHook>,
        interval,
    );
    println!("{id}  polling every {}ms", poller.interval().as_millis());
    let snapshot = poller
        .poll_until_terminal(&id)
        .await
        .map_err(|e| e.to_string())?;

    if snapshot.ingestion_status != IngestionStatus::Completed {
        return Err(format!("resource {id} did not complete"));
    }

    let query = ResourceListQuery::default();
    let page = cache
        .get_or_load(&query, || client.list_resources(&query))
        .await
        .map_err(|e| e.to_string())?;
    println!("library now holds {} resources", page.total);
    Ok(())
}

fn parse_args() -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Ok(None);
        }
        let mut value_for = |flag: &str| {
            args.next()
                .filter(|value| !value.starts_with("--"))
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--id" => options.id = Some(value_for("--id")?),
            "--title" => options.title = Some(value_for("--title")?),
            "--base-url" => options.base_url = Some(value_for("--base-url")?),
            "--interval-ms" => {
                let raw = value_for("--interval-ms")?;
                let ms = raw
                    .parse::<u64>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| format!("--interval-ms must be a positive integer, got {raw}"))?;
                options.interval = Some(Duration::from_millis(ms));
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
            _ if options.url.is_none() => options.url = Some(arg.clone()),
            _ => return Err(format!("unexpected argument {arg}")),
        }
    }
    Ok(Some(options))
}

fn print_help() {
    println!("Submit a URL for ingestion and follow its status until it finishes");
    println!();
    println!("Usage:");
    println!("  watch-ingestion <url> [options]");
    println!("  watch-ingestion --id <resource-id> [options]");
    println!();
    println!("Options:");
    println!("  --title <text>        Title for the new resource");
    println!("  --id <resource-id>    Watch an existing resource instead of submitting");
    println!("  --base-url <url>      API base URL (default: NEO_ALEXANDRIA_API_BASE_URL)");
    println!("  --interval-ms <n>     Poll interval (default: NEO_ALEXANDRIA_POLL_INTERVAL_MS)");
    println!("  -h, --help            Show this help");
}
