//! Text summary builder for CLI output.
//!
//! Formats a dashboard view and session notices as human-readable lines for
//! the `dashboard` and `control` commands.

use crate::dashboard::{DashboardView, GroupReport, Level, Notice};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn icon_prefix(icon: Option<&str>) -> String {
    icon.filter(|s| !s.trim().is_empty())
        .map(|s| format!("[{s}] "))
        .unwrap_or_default()
}

/// Build a text summary of everything a user can see.
pub(crate) fn build_text_summary(view: &DashboardView) -> TextSummary {
    let mut lines = Vec::new();

    if view.groups.is_empty() && view.containers.is_empty() {
        lines.push("Nothing to show: no containers are assigned to this account.".to_string());
        return TextSummary { lines };
    }

    for group in &view.groups {
        lines.push(format!(
            "Group #{} {}{} ({} running)",
            group.id,
            icon_prefix(group.icon.as_deref()),
            group.name,
            group.status
        ));
        for m in &group.members {
            let delay = if m.delay_seconds > 0 {
                format!(", then wait {}s", m.delay_seconds)
            } else {
                String::new()
            };
            lines.push(format!(
                "  {:>3}. #{} {:<24} {}{}",
                m.startup_order, m.container_id, m.display_name, m.status, delay
            ));
        }
    }

    if !view.containers.is_empty() {
        if !view.groups.is_empty() {
            lines.push(String::new());
        }
        lines.push("Containers:".to_string());
        for c in &view.containers {
            lines.push(format!(
                "  #{} {}{:<24} {}",
                c.id,
                icon_prefix(c.icon.as_deref()),
                c.display_name,
                c.status
            ));
        }
    }

    TextSummary { lines }
}

/// One line for a session notice.
pub(crate) fn notice_line(notice: &Notice) -> String {
    let tag = match notice.level {
        Level::Success => "ok",
        Level::Info => "info",
        Level::Danger => "error",
    };
    format!("[{tag}] {}", notice.message)
}

/// The group notice followed by one line per failed member.
pub(crate) fn group_report_lines(report: &GroupReport) -> Vec<String> {
    let mut lines = vec![notice_line(&report.notice)];
    for (id, reason) in &report.failures {
        lines.push(format!("  #{id} {reason}"));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{ContainerCard, GroupCard, MemberCard};
    use crate::status::WorkloadStatus;

    #[test]
    fn groups_come_before_standalone_containers() {
        let view = DashboardView {
            groups: vec![GroupCard {
                id: 1,
                name: "media".into(),
                icon: None,
                status: "1/2".into(),
                members: vec![
                    MemberCard {
                        container_id: 3,
                        display_name: "Sonarr".into(),
                        startup_order: 0,
                        delay_seconds: 5,
                        status: WorkloadStatus::Reported("running".into()),
                    },
                    MemberCard {
                        container_id: 4,
                        display_name: "Radarr".into(),
                        startup_order: 1,
                        delay_seconds: 0,
                        status: WorkloadStatus::NotFound,
                    },
                ],
            }],
            containers: vec![ContainerCard {
                id: 9,
                display_name: "Nextcloud".into(),
                icon: Some("cloud.png".into()),
                status: WorkloadStatus::Reported("exited".into()),
            }],
        };
        let lines = build_text_summary(&view).lines;
        assert_eq!(lines[0], "Group #1 media (1/2 running)");
        assert!(lines[1].contains("Sonarr") && lines[1].ends_with("running, then wait 5s"));
        assert!(lines[2].ends_with("not found"));
        assert_eq!(lines[4], "Containers:");
        assert!(lines[5].starts_with("  #9 [cloud.png] Nextcloud"));
    }

    #[test]
    fn empty_view_says_so() {
        let lines = build_text_summary(&DashboardView::default()).lines;
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn notices_are_tagged_by_level() {
        let n = Notice {
            level: Level::Danger,
            message: "Container web not found".into(),
        };
        assert_eq!(notice_line(&n), "[error] Container web not found");
    }

    #[test]
    fn group_report_lists_each_failure() {
        let report = GroupReport {
            notice: Notice {
                level: Level::Danger,
                message: "Group media started with 2 failure(s).".into(),
            },
            failures: [
                (7, "Container sonarr not found".to_string()),
                (3, "Container radarr not found".to_string()),
            ]
            .into_iter()
            .collect(),
        };
        assert_eq!(
            group_report_lines(&report),
            vec![
                "[error] Group media started with 2 failure(s).".to_string(),
                "  #3 Container radarr not found".to_string(),
                "  #7 Container sonarr not found".to_string(),
            ]
        );
    }
}
