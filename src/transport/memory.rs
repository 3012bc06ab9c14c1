//! In-process channel pair.

use tokio::sync::mpsc;

use crate::transport::{ClientEndpoint, Endpoint, HostEndpoint};

/// Create a connected client/host endpoint pair with bounded queues.
pub fn pair(capacity: usize) -> (ClientEndpoint, HostEndpoint) {
    let capacity = capacity.max(1);
    let (to_host, from_client) = mpsc::channel(capacity);
    let (to_client, from_host) = mpsc::channel(capacity);

    (
        Endpoint {
            outbound: to_host,
            inbound: from_host,
            max_frame_bytes: None,
        },
        Endpoint {
            outbound: to_client,
            inbound: from_client,
            max_frame_bytes: None,
        },
    )
}
