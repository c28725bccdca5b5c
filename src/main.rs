use pollserve::config::Config;
use pollserve::server::Reactor;
use pollserve::transfer::FileResource;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let resource = FileResource::new(&cfg.transfer.resource);
    tracing::info!(
        resource = %resource.path().display(),
        chunk_size = cfg.transfer.chunk_size,
        "Starting"
    );

    let mut reactor = Reactor::bind(&cfg, resource)?;

    reactor.run()
}
