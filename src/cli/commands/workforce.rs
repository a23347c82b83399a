use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{
    ClockEventType, ClockRecord, DayOfWeek, DayWindow, OffHoursAction, ScheduleKind, WeeklyPattern,
    WorkSchedule,
};

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Set a simple weekly 9-5 style schedule for an agent.
    Set {
        agent_id: String,
        org_id: String,
        #[arg(long, default_value = "UTC")]
        timezone: String,
        /// Comma-separated working days, e.g. "mon,tue,wed,thu,fri".
        #[arg(long, default_value = "mon,tue,wed,thu,fri")]
        days: String,
        #[arg(long, default_value = "09:00")]
        start: String,
        #[arg(long, default_value = "17:00")]
        end: String,
        #[arg(long, default_value = "stop")]
        off_hours_action: String,
        #[arg(long, default_value_t = 5)]
        grace_period_minutes: u32,
    },
    /// Manually clock an agent in.
    ClockIn { agent_id: String, org_id: String },
    /// Manually clock an agent out.
    ClockOut { agent_id: String, org_id: String, #[arg(long)] reason: Option<String> },
}

fn parse_day(s: &str) -> anyhow::Result<DayOfWeek> {
    Ok(match s.trim().to_lowercase().as_str() {
        "mon" => DayOfWeek::Mon,
        "tue" => DayOfWeek::Tue,
        "wed" => DayOfWeek::Wed,
        "thu" => DayOfWeek::Thu,
        "fri" => DayOfWeek::Fri,
        "sat" => DayOfWeek::Sat,
        "sun" => DayOfWeek::Sun,
        other => anyhow::bail!("unknown day: {other}"),
    })
}

fn parse_off_hours(s: &str) -> anyhow::Result<OffHoursAction> {
    Ok(match s {
        "stop" => OffHoursAction::Stop,
        "pause" => OffHoursAction::Pause,
        "queue" => OffHoursAction::Queue,
        other => anyhow::bail!("unknown off-hours action: {other}"),
    })
}

#[derive(Serialize)]
pub struct ScheduleOutput {
    pub agent_id: String,
    pub timezone: String,
    pub off_hours_action: String,
    pub grace_period_minutes: u32,
}

impl CommandOutput for ScheduleOutput {
    fn to_human(&self) -> String {
        format!(
            "agent {}  tz={}  off_hours={}  grace={}m",
            self.agent_id, self.timezone, self.off_hours_action, self.grace_period_minutes
        )
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Serialize)]
pub struct ClockEventOutput {
    pub agent_id: String,
    pub event_type: String,
}

impl CommandOutput for ClockEventOutput {
    fn to_human(&self) -> String {
        format!("agent {} {}", self.agent_id, self.event_type)
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(ctx: &AppContext, command: ScheduleCommands, json: bool) -> anyhow::Result<()> {
    match command {
        ScheduleCommands::Set { agent_id, org_id, timezone, days, start, end, off_hours_action, grace_period_minutes } => {
            let window = DayWindow {
                start: chrono::NaiveTime::parse_from_str(&start, "%H:%M")?,
                end: chrono::NaiveTime::parse_from_str(&end, "%H:%M")?,
            };
            let mut pattern = WeeklyPattern::default();
            for day in days.split(',') {
                pattern.days.push((parse_day(day)?, window.clone()));
            }
            let now = Utc::now();
            let schedule = WorkSchedule {
                id: uuid::Uuid::new_v4().to_string(),
                agent_id: agent_id.clone(),
                org_id,
                timezone: timezone.clone(),
                kind: ScheduleKind::Standard { pattern },
                enforce_clock_in: true,
                enforce_clock_out: true,
                auto_wake_enabled: true,
                off_hours_action: parse_off_hours(&off_hours_action)?,
                grace_period_minutes,
                enabled: true,
                created_at: now,
                updated_at: now,
            };
            ctx.store.upsert_schedule(&schedule).await?;
            output(
                &ScheduleOutput {
                    agent_id,
                    timezone,
                    off_hours_action: off_hours_str(schedule.off_hours_action),
                    grace_period_minutes,
                },
                json,
            );
        }
        ScheduleCommands::ClockIn { agent_id, org_id } => {
            let record = clock_record(&agent_id, &org_id, ClockEventType::ClockIn, "operator", None);
            ctx.store.insert_clock_record(&record).await?;
            output(&ClockEventOutput { agent_id, event_type: "clocked_in".to_string() }, json);
        }
        ScheduleCommands::ClockOut { agent_id, org_id, reason } => {
            let record = clock_record(&agent_id, &org_id, ClockEventType::ClockOut, "operator", reason);
            ctx.store.insert_clock_record(&record).await?;
            output(&ClockEventOutput { agent_id, event_type: "clocked_out".to_string() }, json);
        }
    }
    Ok(())
}

fn off_hours_str(action: OffHoursAction) -> String {
    match action {
        OffHoursAction::Stop => "stop",
        OffHoursAction::Pause => "pause",
        OffHoursAction::Queue => "queue",
    }
    .to_string()
}

fn clock_record(agent_id: &str, org_id: &str, event_type: ClockEventType, triggered_by: &str, reason: Option<String>) -> ClockRecord {
    ClockRecord {
        id: uuid::Uuid::new_v4().to_string(),
        agent_id: agent_id.to_string(),
        org_id: org_id.to_string(),
        event_type,
        triggered_by: triggered_by.to_string(),
        scheduled_at: None,
        actual_at: Utc::now(),
        reason,
        metadata: serde_json::Value::Null,
    }
}

#[derive(Subcommand)]
pub enum WorkforceCommands {
    /// Run one workforce scheduler tick immediately and report what it did.
    Status { org_id: String },
}

#[derive(Serialize)]
pub struct WorkforceStatusOutput {
    pub org_id: String,
    pub agent_count: usize,
    pub pending_approvals: usize,
}

impl CommandOutput for WorkforceStatusOutput {
    fn to_human(&self) -> String {
        format!(
            "org {}: {} agents, {} pending approvals",
            self.org_id, self.agent_count, self.pending_approvals
        )
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute_workforce(ctx: &AppContext, command: WorkforceCommands, json: bool) -> anyhow::Result<()> {
    match command {
        WorkforceCommands::Status { org_id } => {
            ctx.scheduler.tick().await?;
            let agents = ctx.store.list_agents_by_org(&org_id).await?;
            let approvals = ctx.store.list_approvals_by_org(&org_id).await?;
            let pending = approvals.iter().filter(|a| !a.status.is_terminal()).count();
            output(
                &WorkforceStatusOutput { org_id, agent_count: agents.len(), pending_approvals: pending },
                json,
            );
        }
    }
    Ok(())
}
