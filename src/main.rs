use copymint::config::AppConfig;
use copymint::context::AppContext;
use copymint::error::ApiResult;
use copymint::{jobs, server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "copymint=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    let config = AppConfig::from_env()?;

    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ______                            _       __
  / ____/___  ____  __  ______ ___  (_)___  / /_
 / /   / __ \/ __ \/ / / / __ `__ \/ / __ \/ __/
/ /___/ /_/ / /_/ / /_/ / / / / / / / / / / /_
\____/\____/ .___/\__, /_/ /_/ /_/_/_/ /_/\__/
          /_/    /____/

        AI copywriting backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
