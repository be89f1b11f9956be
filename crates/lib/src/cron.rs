//! Scheduled (cron) jobs reported by the gateway.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CronStatus {
    Running,
    Idle,
    Error,
    Disabled,
}

/// Cron job record carried by `cron.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub id: String,
    pub name: String,
    /// Schedule description as sent by the gateway (e.g. "Every 30 min" or a cron expression).
    pub schedule: String,
    pub status: CronStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Payload of `cron.start` / `cron.end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Insert `job` or replace the entry with the same id, keeping `jobs` sorted by name.
pub fn upsert_sorted(jobs: &mut Vec<CronJob>, job: CronJob) {
    jobs.retain(|j| j.id != job.id);
    let at = jobs.partition_point(|j| j.name <= job.name);
    jobs.insert(at, job);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, name: &str) -> CronJob {
        CronJob {
            id: id.to_string(),
            name: name.to_string(),
            schedule: "Every 30 min".to_string(),
            status: CronStatus::Idle,
            last_run: None,
            next_run: None,
            agent_id: None,
        }
    }

    #[test]
    fn upsert_keeps_name_order_and_replaces_by_id() {
        let mut jobs = Vec::new();
        upsert_sorted(&mut jobs, job("c2", "nightly backup"));
        upsert_sorted(&mut jobs, job("c1", "heartbeat"));
        upsert_sorted(&mut jobs, job("c3", "memory digest"));
        let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, ["heartbeat", "memory digest", "nightly backup"]);

        let mut running = job("c2", "a-renamed backup");
        running.status = CronStatus::Running;
        upsert_sorted(&mut jobs, running);
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].id, "c2");
        assert_eq!(jobs[0].status, CronStatus::Running);
    }

    #[test]
    fn cron_job_parses_optional_fields() {
        let j: CronJob = serde_json::from_str(
            r#"{"id":"c1","name":"heartbeat","schedule":"*/5 * * * *","status":"disabled","nextRun":"soon","agentId":"yuri"}"#,
        )
        .unwrap();
        assert_eq!(j.status, CronStatus::Disabled);
        assert_eq!(j.next_run.as_deref(), Some("soon"));
        assert_eq!(j.agent_id.as_deref(), Some("yuri"));
        assert!(j.last_run.is_none());
    }
}
