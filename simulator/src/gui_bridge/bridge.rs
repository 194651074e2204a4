use crate::gui_bridge::model::StatusModel;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
};
use tokio::runtime::Builder;
use warp::Filter;

fn status_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9100))
}

/// Hosts the live-status HTTP endpoint for external consumers.
///
/// The pipeline publishes into shared state; `GET /status` serves the most
/// recent snapshot as JSON.
#[derive(Clone)]
pub struct StatusBridge {
    state: Arc<RwLock<StatusModel>>,
}

impl StatusBridge {
    pub fn new(serve: bool) -> Self {
        let state = Arc::new(RwLock::new(StatusModel::default()));

        if serve {
            let state_for_filter = state.clone();
            let state_filter = warp::any().map(move || state_for_filter.clone());
            let status_route = warp::path("status")
                .and(warp::get())
                .and(state_filter)
                .map(|state: Arc<RwLock<StatusModel>>| {
                    let snapshot = state
                        .read()
                        .map(|model| model.clone())
                        .unwrap_or_default();
                    warp::reply::json(&snapshot)
                });

            thread::spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        eprintln!("status bridge runtime failed: {}", err);
                        return;
                    }
                };
                runtime.block_on(async move {
                    warp::serve(status_route).run(status_bind_address()).await;
                });
            });
        }

        Self { state }
    }

    pub fn publish(&self, model: StatusModel) {
        if let Ok(mut guard) = self.state.write() {
            *guard = model;
        }
    }

    pub fn publish_status(&self, message: &str) {
        println!("[status] {}", message);
    }

    pub fn snapshot(&self) -> StatusModel {
        self.state
            .read()
            .map(|model| model.clone())
            .unwrap_or_default()
    }
}
