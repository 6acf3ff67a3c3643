#![allow(dead_code)]

pub mod test_cluster;

use std::future::Future;
use std::time::Duration;

/// Fail the test instead of hanging on a wait that never resolves
pub async fn within<F: Future>(future: F) -> F::Output {
    match tokio::time::timeout(Duration::from_secs(5), future).await {
        Ok(output) => output,
        Err(_) => panic!("operation did not complete within 5s"),
    }
}
