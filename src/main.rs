use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;
use inference_gateway::config::Config;
use inference_gateway::{build_router, build_state, init_tracing, spawn_background_tasks, SHUTDOWN_DRAIN_TIMEOUT};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
	dotenv::dotenv().ok();

	let config = match Config::try_parse() {
		Ok(config) => config,
		Err(err) => {
			eprintln!("{err}");
			return ExitCode::from(1);
		}
	};

	init_tracing(&config);

	let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
		Ok(addr) => addr,
		Err(err) => {
			tracing::error!(error = %err, "invalid HOST/PORT configuration");
			return ExitCode::from(1);
		}
	};

	let state = build_state(config);
	let app = build_router(state.clone());

	let listener = match TcpListener::bind(addr).await {
		Ok(listener) => listener,
		Err(err) => {
			tracing::error!(error = %err, %addr, "failed to bind listener");
			return ExitCode::from(2);
		}
	};
	tracing::info!(%addr, "inference gateway listening");

	let shutdown = CancellationToken::new();
	let (reaper, prober) = spawn_background_tasks(state, shutdown.clone());

	let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>());

	let shutdown_for_signal = shutdown.clone();
	let signal_task = tokio::spawn(async move {
		let _ = tokio::signal::ctrl_c().await;
		tracing::info!("received shutdown signal");
		shutdown_for_signal.cancel();
	});

	tokio::select! {
		result = server => {
			if let Err(err) = result {
				tracing::error!(error = %err, "server error");
			}
			tracing::info!("server stopped");
		}
		_ = shutdown.cancelled() => {
			tracing::info!("shutdown initiated by signal");
		}
	}

	shutdown.cancel();
	signal_task.abort();

	let drain = async {
		let _ = reaper.await;
		let _ = prober.await;
	};
	if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, drain).await.is_err() {
		tracing::warn!("background tasks did not finish within the shutdown drain timeout");
	}

	tracing::info!("shutdown complete");
	ExitCode::SUCCESS
}
