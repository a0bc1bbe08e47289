use clap::Parser;
use env_logger::Env;
use log::{error, info};
use pvvx_listener::app::{self, Options};
use std::panic::{self, PanicHookInfo};
use tokio_util::sync::CancellationToken;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Process managers (systemd, Telegraf execd) watch the exit status.
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    let default_level = if options.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping scan");
            on_interrupt.cancel();
        }
    });

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match app::run(options, &mut out, cancel).await {
        Ok(_) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            error!("{}", why);
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
