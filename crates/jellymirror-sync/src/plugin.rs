//! Playback Reporting plugin import helpers
//!
//! The plugin keeps its own playback table on the server and exposes it
//! through a custom-query endpoint. Only rows outside the date range
//! already mirrored locally, or past the last imported rowid, are
//! requested.

use chrono::{DateTime, Utc};
use jellymirror_core::ports::{ActivityBounds, RemotePlugin};

/// Configuration file names the plugin has shipped under
pub const PLAYBACK_REPORTING_CONFIG_FILES: &[&str] = &[
    "playback_reporting.xml",
    "Jellyfin.Plugin.PlaybackReporting.xml",
];

const PLUGIN_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn has_playback_reporting(plugins: &[RemotePlugin]) -> bool {
    plugins.iter().any(|p| {
        p.configuration_file_name
            .as_deref()
            .is_some_and(|f| PLAYBACK_REPORTING_CONFIG_FILES.contains(&f))
    })
}

fn plugin_date(date: DateTime<Utc>) -> String {
    date.format(PLUGIN_DATE_FORMAT).to_string()
}

/// Builds the custom query selecting rows not yet mirrored
pub fn build_import_query(bounds: ActivityBounds, max_rowid: Option<i64>) -> String {
    let mut query = String::from("SELECT rowid, * FROM PlaybackActivity");

    match (bounds.oldest, bounds.newest) {
        (Some(oldest), Some(newest)) => {
            query.push_str(&format!(
                " WHERE (DateCreated < '{}' or DateCreated > '{}')",
                plugin_date(oldest),
                plugin_date(newest)
            ));
        }
        (Some(oldest), None) => {
            query.push_str(&format!(" WHERE DateCreated < '{}'", plugin_date(oldest)));
            if let Some(max) = max_rowid {
                query.push_str(&format!(" AND rowid > {max}"));
            }
        }
        (None, Some(newest)) => {
            query.push_str(&format!(" WHERE DateCreated > '{}'", plugin_date(newest)));
            if let Some(max) = max_rowid {
                query.push_str(&format!(" AND rowid > {max}"));
            }
        }
        (None, None) => {
            if let Some(max) = max_rowid {
                query.push_str(&format!(" WHERE rowid > {max}"));
            }
        }
    }

    query.push_str(" order by rowid");
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, hour, 30, 15).unwrap()
    }

    #[test]
    fn query_without_local_data_fetches_everything() {
        assert_eq!(
            build_import_query(ActivityBounds::default(), None),
            "SELECT rowid, * FROM PlaybackActivity order by rowid"
        );
    }

    #[test]
    fn query_resumes_after_last_rowid() {
        assert_eq!(
            build_import_query(ActivityBounds::default(), Some(42)),
            "SELECT rowid, * FROM PlaybackActivity WHERE rowid > 42 order by rowid"
        );
    }

    #[test]
    fn query_excludes_mirrored_date_range() {
        let bounds = ActivityBounds {
            oldest: Some(at(1, 8)),
            newest: Some(at(3, 22)),
        };
        assert_eq!(
            build_import_query(bounds, Some(42)),
            "SELECT rowid, * FROM PlaybackActivity WHERE \
             (DateCreated < '2026-10-01 08:30:15' or DateCreated > '2026-10-03 22:30:15') \
             order by rowid"
        );
    }

    #[test]
    fn query_with_single_bound_adds_rowid() {
        let bounds = ActivityBounds {
            oldest: None,
            newest: Some(at(2, 9)),
        };
        assert_eq!(
            build_import_query(bounds, Some(7)),
            "SELECT rowid, * FROM PlaybackActivity WHERE DateCreated > '2026-10-02 09:30:15' \
             AND rowid > 7 order by rowid"
        );
    }

    #[test]
    fn detects_either_config_file_name() {
        let plugin = |file: Option<&str>| RemotePlugin {
            name: Some("Playback Reporting".into()),
            version: None,
            configuration_file_name: file.map(str::to_owned),
        };
        assert!(has_playback_reporting(&[plugin(Some("playback_reporting.xml"))]));
        assert!(has_playback_reporting(&[
            plugin(None),
            plugin(Some("Jellyfin.Plugin.PlaybackReporting.xml"))
        ]));
        assert!(!has_playback_reporting(&[plugin(Some("tmdb.xml"))]));
        assert!(!has_playback_reporting(&[]));
    }
}
