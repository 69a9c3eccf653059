//! Exponential backoff retry for transient Nessie failures.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::CatalogError;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Retry `f` up to `MAX_RETRIES` additional times on transient errors, with
/// exponential backoff (0.5s, 1s, 2s). Non-transient errors propagate
/// immediately without a retry.
pub async fn retry_on_transient<T, F, Fut>(op_name: &str, mut f: F) -> Result<T, CatalogError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                let delay = INITIAL_BACKOFF * 2u32.pow(attempt);
                warn!(
                    "Nessie call {op_name} failed (attempt {}/{}): {e} — retrying in {:?}",
                    attempt + 1,
                    MAX_RETRIES + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    error!("Nessie call {op_name} failed after {} attempts: {e}", attempt + 1);
                }
                return Err(e);
            }
        }
    }
}
