//! Idle-deletion notices

/// Subject line naming the filesystem and the deletion
pub fn deletion_subject(id: &str) -> String {
    format!("Unused FSx for Lustre ID: {} deletion.", id)
}

/// Body with the id, sampling period and uptime at deletion
pub fn deletion_message(id: &str, sampling_period_secs: u32, uptime_mins: f64) -> String {
    format!(
        "No activity on FSx for Lustre File System ID {} at a sampling period of {} seconds. \
         Delete has been initiated. Uptime: {:.1} mins.",
        id, sampling_period_secs, uptime_mins
    )
}
