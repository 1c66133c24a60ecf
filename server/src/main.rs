use std::sync::Arc;

use codefest_server::config::Env;
use shared::github::GithubClient;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

#[rocket::launch]
async fn rocket() -> _ {
    dotenv::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().pretty());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let env = Env::from_env().expect("Failed to load environment variables");
    let scoring = Env::points_formula().expect("Failed to load POINTS_* variables");
    let github =
        GithubClient::new(env.github_config()).expect("Failed to create GitHub client");

    let span = tracing::info_span!("Starting Rocket");
    let _enter = span.enter();

    codefest_server::build(env, Arc::new(github), Arc::new(scoring))
        .expect("Failed to configure Rocket")
}
