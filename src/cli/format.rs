//! Output formatting for CLI display.

use jiff::Timestamp;

use crate::model::{DecisionLogEntry, FileLock, InstanceReport};

/// One line summarizing an instance: id, liveness, role, task, branch.
pub(super) fn format_instance_line(report: &InstanceReport) -> String {
    let i = &report.instance;
    let branch = i
        .branch
        .as_deref()
        .map(|b| format!("  (branch {b})"))
        .unwrap_or_default();
    format!(
        "{}  [{}]  {}  {:?}{branch}",
        i.instance_id, report.status, i.role, i.task
    )
}

/// One line for a lock: path, owner, lease state, optionally the intent.
pub(super) fn describe_lock(lock: &FileLock, verbose: bool) -> String {
    let mut line = format!(
        "{}  held by {}  ({})",
        lock.path,
        lock.owner_instance_id,
        format_ttl(lock.expires_at)
    );
    if verbose && !lock.intent.is_empty() {
        line.push_str(&format!("  intent {:?}", lock.intent));
    }
    line
}

/// One line for a decision: id, category, title, scope.
pub(super) fn format_decision_line(entry: &DecisionLogEntry) -> String {
    let scope = entry
        .scope
        .as_deref()
        .map(|s| format!("  ({s})"))
        .unwrap_or_default();
    format!("{}  [{}]  {}{scope}", entry.decision_id, entry.category, entry.title)
}

/// Human lease state relative to now: "expires in 4m32s" or
/// "expired 12s ago".
pub(super) fn format_ttl(expires_at: Timestamp) -> String {
    let secs = expires_at.duration_since(Timestamp::now()).as_secs();
    if secs >= 0 {
        format!("expires in {}", human_secs(secs))
    } else {
        format!("expired {} ago", human_secs(-secs))
    }
}

fn human_secs(secs: i64) -> String {
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::SignedDuration;

    #[test]
    fn ttl_reads_forward_and_backward() {
        let future = Timestamp::now() + SignedDuration::from_secs(290);
        assert!(format_ttl(future).starts_with("expires in 4m"));

        let past = Timestamp::now() - SignedDuration::from_secs(30);
        assert!(format_ttl(past).starts_with("expired "));
        assert!(format_ttl(past).ends_with(" ago"));
    }

    #[test]
    fn seconds_humanize_into_minutes() {
        assert_eq!(human_secs(5), "5s");
        assert_eq!(human_secs(59), "59s");
        assert_eq!(human_secs(60), "1m00s");
        assert_eq!(human_secs(272), "4m32s");
    }
}
