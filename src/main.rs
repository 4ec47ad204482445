use axum::{
    Extension, Router,
    routing::{get, post},
};
use routing_cluster::config::{RoutingConf, ServerState};
use routing_cluster::edges::EdgeMonitor;
use routing_cluster::edges::handlers::{
    ConfSource, ENDPOINT_EDGE, ENDPOINT_EDGES, ENDPOINT_RELOAD, handle_get_edge,
    handle_list_edges, handle_reload,
};
use routing_cluster::server::EdgeServer;
use routing_cluster::transport::TcpTransport;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut conf_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--conf" if i + 1 < args.len() => {
                conf_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let Some(conf_path) = conf_path else {
        eprintln!("Usage: {} --conf <routing.json>", args[0]);
        eprintln!("Example: {} --conf conf/node-1.json", args[0]);
        std::process::exit(1);
    };

    let conf = RoutingConf::load(&conf_path)?;
    tracing::info!(
        "Starting node {} (work port {}, {} configured peer(s))",
        conf.node_id,
        conf.work_port,
        conf.routing.len()
    );

    // 1. Edge monitor:
    let monitor = EdgeMonitor::new(ServerState::new(conf.clone()), Arc::new(TcpTransport::new()))?;

    // 2. Inbound edges:
    let work_addr = SocketAddr::from(([0, 0, 0, 0], conf.work_port));
    let server = EdgeServer::bind(work_addr, monitor.clone()).await?;
    tokio::spawn(server.run());

    // 3. Heartbeat loop:
    let monitor_handle = monitor.start();

    // 4. Stats reporter:
    let stats_monitor = monitor.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            tracing::info!(
                "Edge stats: {}/{} outbound active, {} inbound",
                stats_monitor.outbound().active_count(),
                stats_monitor.outbound().len(),
                stats_monitor.inbound().len()
            );
            for edge in stats_monitor.outbound().statuses() {
                tracing::info!(
                    "  -> node {} at {}:{} active={}",
                    edge.id,
                    edge.host,
                    edge.port,
                    edge.active
                );
            }
        }
    });

    // 5. HTTP status surface:
    let app = Router::new()
        .route(ENDPOINT_EDGES, get(handle_list_edges))
        .route(ENDPOINT_RELOAD, post(handle_reload))
        .route(ENDPOINT_EDGE, get(handle_get_edge))
        .layer(Extension(monitor.clone()))
        .layer(Extension(Arc::new(ConfSource(conf_path))));

    let http_addr = SocketAddr::from(([0, 0, 0, 0], conf.http_port()));
    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("Shutting down edge monitor");
    monitor.shutdown();
    let _ = monitor_handle.await;

    Ok(())
}
