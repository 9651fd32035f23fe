use crate::error::Result;

/// Lowercase hex dump without separators, as logged for garbled frames.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Run `op` up to `attempts` times (at least once), returning the first
/// success or the last error. Non-transient errors end the loop at once.
pub fn retry<T>(attempts: u8, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let attempts = attempts.max(1);
    let mut n = 1;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if n < attempts && e.is_transient() => {
                tracing::trace!(attempt = n, error = %e, "register read failed, retrying");
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
