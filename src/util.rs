use std::time::{SystemTime, UNIX_EPOCH};

pub struct JoinHandleWrapper(Option<tokio::task::JoinHandle<()>>);

impl From<tokio::task::JoinHandle<()>> for JoinHandleWrapper {
    fn from(handle: tokio::task::JoinHandle<()>) -> Self {
        Self(handle.into())
    }
}

impl JoinHandleWrapper {
    pub fn new(handle: tokio::task::JoinHandle<()>) -> Self {
        Self(Some(handle))
    }

    pub async fn join(&mut self) {
        if let Some(handle) = self.0.take() {
            if let Err(err) = handle.await {
                tracing::error!("sub task join failed: {:?}", err);
            }
        }
    }
}

pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
