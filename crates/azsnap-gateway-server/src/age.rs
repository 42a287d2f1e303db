use chrono::{DateTime, Utc};

use azsnap_arm::{SnapshotPager, SnapshotsApi};
use azsnap_common::SnapshotSummary;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// True when more than `days * 24` hours have passed between `created` and `now`.
pub fn is_older_than(created: DateTime<Utc>, now: DateTime<Utc>, days: i64) -> bool {
    let elapsed_hours = (now - created).num_milliseconds() as f64 / MILLIS_PER_HOUR;
    elapsed_hours > days.saturating_mul(24) as f64
}

/// Scans every listing page and keeps snapshots older than `days`, in provider order.
///
/// `now` is fixed for the whole scan. Snapshots without a creation time are skipped.
/// Any page failure aborts the scan.
pub async fn collect_older_than(
    api: &dyn SnapshotsApi,
    days: i64,
    now: DateTime<Utc>,
) -> azsnap_arm::Result<Vec<SnapshotSummary>> {
    let mut pager = SnapshotPager::new(api);
    let mut matches = Vec::new();

    while pager.more() {
        let page = pager.next_page().await?;
        for snapshot in page.value {
            let Some(created) = snapshot.time_created() else {
                continue;
            };
            if is_older_than(created, now, days) {
                matches.push(SnapshotSummary {
                    name: snapshot.name.unwrap_or_default(),
                    resource_group: snapshot.id.unwrap_or_default(),
                    creation_time: created,
                });
            }
        }
    }

    Ok(matches)
}
