#[cfg(feature = "mimalloc-allocator")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(not(feature = "mimalloc-allocator"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = <treb::cli::Args as clap::Parser>::parse();
    observe::tracing::initialize(&args.log_filter, tracing::Level::ERROR);
    observe::panic_hook::install();

    match treb::start(args).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(?err, "treb run failed");
            std::process::ExitCode::from(exit_code(&err))
        }
    }
}

/// Maps a failure to the exit codes the CLI documents: 1 user/config error,
/// 2 script execution failure, 3 registry projection failure.
fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<treb::domain::error::ProjectionError>().is_some() {
        3
    } else if err.to_string().contains("script execution failed") {
        2
    } else {
        1
    }
}
