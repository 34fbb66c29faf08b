mod app;
mod core;
mod pipeline;
mod rtb;

use crate::app::context::StartupContext;
use crate::app::shutdown::build_shutdown_pipeline;
use crate::app::startup::build_start_pipeline;
use actix_web::rt::signal;
use std::sync::Arc;

#[actix_web::main]
async fn main() {
    let cfg_path = std::env::var("REX_CONFIG").unwrap_or_else(|_| "rex.yaml".to_string());
    let startup_pipeline = build_start_pipeline(cfg_path.into());
    let ctx = Arc::new(StartupContext::default());

    match startup_pipeline.run(&ctx).await {
        Ok(_) => println!("Startup successful"),
        Err(e) => panic!("Startup failed: {:?}", e),
    }

    let shutdown_pipeline = build_shutdown_pipeline();

    signal::ctrl_c().await.expect("Failed to listen for sigint");

    match shutdown_pipeline.run(&ctx).await {
        Ok(_) => println!("Shutdown successful"),
        Err(e) => panic!("Clean shutdown failed {:?}", e),
    }
}
