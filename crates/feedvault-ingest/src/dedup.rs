//! Dedup tracker
//!
//! Decides which inbox files still need processing by comparing each file's
//! final name against the basenames of keys already in the destination store.
//! Only the basename is compared because destination keys carry a
//! type/provider prefix the inbox listing knows nothing about.

use std::collections::HashSet;
use tracing::debug;

use crate::model::RemoteFileHandle;
use crate::naming;

/// Inbox files not yet represented in the destination store, in listing order.
///
/// Detached signatures are dropped outright.
pub fn pending<I, S>(remote: Vec<RemoteFileHandle>, uploaded_keys: I) -> Vec<RemoteFileHandle>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let uploaded: HashSet<String> = uploaded_keys
        .into_iter()
        .map(|key| naming::basename(key.as_ref()).to_string())
        .collect();

    remote
        .into_iter()
        .filter(|handle| {
            if naming::is_signature(&handle.name) {
                debug!(file = %handle, "Skipping detached signature");
                return false;
            }
            if uploaded.contains(handle.final_name()) {
                debug!(file = %handle, "Already in destination store");
                return false;
            }
            true
        })
        .collect()
}
