use clap::{Parser, ValueEnum};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use sni_renew::{ChallengeMode, HerokuApi, RenewConfig, RenewOutcome, Renewal, Shutdown, ShutdownTrigger, HEROKU_API_URL};
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(about = "Obtain or renew the Let's Encrypt certificate of an app's SNI endpoint")]
struct Args {
    /// App to manage
    #[clap(short, long, env = "HEROKU_APP")]
    app: String,

    /// Platform api token
    #[clap(long, env = "HEROKU_API_KEY", hide_env_values = true)]
    api_key: String,

    #[clap(long, env = "HEROKU_API_URL", default_value = HEROKU_API_URL)]
    api_url: String,

    /// `production`, `staging` or an ACME directory url
    #[clap(long, env = "LETSENCRYPT_SERVER", default_value = "production")]
    server: String,

    /// Renew when fewer days than this remain
    #[clap(long, env = "EXPIRATION_THRESHOLD", default_value = "7")]
    threshold: i64,

    #[clap(long, env = "LETSENCRYPT_DEBUG")]
    debug: bool,

    /// How the app gets the challenge proofs
    #[clap(long, env = "LETSENCRYPT_CHALLENGE", value_enum, default_value = "store")]
    challenge: Challenge,

    /// Redis for the store challenge, defaults to the app's REDIS_URL
    #[clap(long)]
    redis_url: Option<String>,

    /// Seconds to wait for a restarted app to serve the challenge
    #[clap(long, default_value = "600")]
    challenge_timeout: u64,

    /// Renew even if the installed certificate is still fresh
    #[clap(short, long)]
    force: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Challenge {
    Store,
    Restart,
}

#[async_std::main]
async fn main() {
    let args = Args::parse();
    let level = match args.debug {
        true => log::Level::Debug,
        false => log::Level::Info,
    };
    if let Err(err) = simple_logger::init_with_level(level) {
        eprintln!("could not initialize logging: {}", err);
    }

    let (trigger, shutdown) = Shutdown::new();
    if let Err(err) = forward_signals(trigger) {
        log::warn!("could not register signal handlers: {}", err);
    }

    let challenge = match args.challenge {
        Challenge::Store => ChallengeMode::Store {
            redis_url: args.redis_url.clone(),
        },
        Challenge::Restart => ChallengeMode::Restart,
    };
    let config = RenewConfig::new()
        .server(&args.server)
        .threshold(args.threshold)
        .force(args.force)
        .challenge(challenge)
        .poll_timeout(Duration::from_secs(args.challenge_timeout));
    let platform = Arc::new(HerokuApi::new(&args.app, &args.api_key).api_url(&args.api_url));
    let issuer = config.acme_client().shutdown(shutdown.clone());
    let renewal = Renewal::new(platform, issuer, config).with_shutdown(shutdown);

    // a signal ends the waits early, the challenge is still removed before this returns
    match renewal.run().await {
        Ok(RenewOutcome::Skipped) => log::info!("{}: nothing to do", args.app),
        Ok(RenewOutcome::Created(endpoint)) | Ok(RenewOutcome::Updated(endpoint)) => {
            log::info!("{}: certificate installed on sni endpoint {}", args.app, endpoint.id)
        }
        Err(err) => {
            log::error!("{}: {}", args.app, err);
            exit(1);
        }
    }
}

fn forward_signals(trigger: ShutdownTrigger) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            log::warn!("received signal {}, shutting down", signal);
            trigger.fire();
        }
    });
    Ok(())
}
