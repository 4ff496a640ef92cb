use emotion_detection_svc::config::parameter;
use emotion_detection_svc::config::settings::SETTINGS;
use emotion_detection_svc::logger::logger::setup_logger;
use emotion_detection_svc::pipeline::emotion_pipeline::emotion_pipeline::EmotionPipeline;
use emotion_detection_svc::routes::root::{root_routes, RouterState};
use emotion_detection_svc::tracer::tracer::init_tracer_provider;
use log::{error, info, warn};
use opentelemetry::global;
use opentelemetry::global::shutdown_tracer_provider;
use tokio::signal;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() {
    // Setup environment and logger
    parameter::init();
    setup_logger(SETTINGS.logger.as_ref());
    let addr = format!("0.0.0.0:{}", SETTINGS.server.http_port);

    // Setup pipeline
    let emotion_pipeline = match EmotionPipeline::load(&SETTINGS.model) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("failed to load emotion detection models: {e}");
            std::process::exit(1);
        }
    };
    info!("completed loading face cascade and emotion model");

    // Setup tracing
    let tracing_enabled = match &SETTINGS.tracer {
        Some(tracer) => match init_tracer_provider(tracer, &SETTINGS.app.name) {
            Ok(tracer_provider) => {
                global::set_tracer_provider(tracer_provider);
                true
            }
            Err(e) => {
                warn!("tracing disabled, failed to initialize tracer provider: {e}");
                false
            }
        },
        None => false,
    };

    // Init server
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to create new listener on {addr}: {e}");
            std::process::exit(1);
        }
    };
    info!("starting api server on {}", SETTINGS.server);
    let router_state = RouterState::new(emotion_pipeline);

    if let Err(e) = axum::serve(listener, root_routes(router_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("api server stopped with error: {e}");
    }

    if tracing_enabled {
        shutdown_tracer_provider();
    }
    info!("api server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
