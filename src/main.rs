#![allow(clippy::all)]
#![deny(
    unused_variables,
    unused_mut,
    unused_attributes,
    clippy::unnecessary_mut_passed,
    clippy::let_underscore_future,
    unused_must_use,
    unconditional_recursion
)]

use clap::Parser;
use cmd_arg::CmdArgs;

use sys::Sys;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

pub mod general;
pub mod master;

pub mod cmd_arg;
pub mod config;
pub mod result;
pub mod sys;
pub mod util;

#[tokio::main]
async fn main() {
    start_tracing();
    let args = CmdArgs::parse();
    let config = config::read_config(args.this_id, &args.config_dir)
        .unwrap_or_else(|err| panic!("read config failed: {:?}", err));
    tracing::info!("config: {:?}", config);
    let mut sys = Sys::new(config);
    sys.wait_for_end().await;
}

pub fn start_tracing() {
    let my_filter = tracing_subscriber::filter::filter_fn(|v| {
        if let Some(mp) = v.module_path() {
            if mp.contains("hyper") {
                return false;
            }
            if *v.level() == Level::DEBUG && mp.contains("reqwest") {
                return false;
            }
        }

        v.level() != &tracing::Level::TRACE
    });
    let my_layer = tracing_subscriber::fmt::layer();
    let _ = tracing_subscriber::registry()
        .with(my_layer.with_filter(my_filter))
        .try_init();
}
