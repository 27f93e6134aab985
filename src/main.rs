use neo_alexandria_lib::config::AppConfig;

#[tokio::main]
async fn main() {
    neo_alexandria_lib::init_tracing();

    let result = match AppConfig::from_env() {
        Ok(config) => neo_alexandria_lib::run(config).await,
        Err(error) => Err(error.into()),
    };
    if let Err(error) = result {
        tracing::error!("neo-alexandria failed: {error}");
        std::process::exit(1);
    }
}
