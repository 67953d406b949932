/// 실행 결과 집계 (역할/스텝별 건수와 지연 시간)
// region:    --- Imports
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use super::{ActionEvent, EventStatus};
use crate::actor::ActorRole;
use crate::outcome::Classification;

// endregion: --- Imports

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepKey {
    pub role: ActorRole,
    pub step: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepStats {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub exception: u64,
    pub skipped: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub latency_min: Option<Duration>,
    pub latency_max: Option<Duration>,
    latency_sum: Duration,
    sent: u64,
}

impl StepStats {
    fn record(&mut self, event: &ActionEvent) {
        self.total += 1;
        match event.classification {
            Classification::Success => self.success += 1,
            Classification::Failure => self.failure += 1,
            Classification::Exception => self.exception += 1,
        }
        match &event.status {
            EventStatus::Code(code) => *self.status_codes.entry(*code).or_default() += 1,
            EventStatus::Skipped(_) => self.skipped += 1,
            EventStatus::Exception(_) => {}
        }
        if event.was_sent() {
            self.sent += 1;
            self.latency_sum += event.latency;
            self.latency_min = Some(self.latency_min.map_or(event.latency, |m| m.min(event.latency)));
            self.latency_max = Some(self.latency_max.map_or(event.latency, |m| m.max(event.latency)));
        }
    }

    /// 실제로 전송된 요청의 평균 지연 시간
    pub fn latency_avg(&self) -> Option<Duration> {
        if self.sent == 0 {
            None
        } else {
            let nanos = self.latency_sum.as_nanos() / u128::from(self.sent);
            Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
        }
    }
}

/// 대상 서비스 도달 여부
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunHealth {
    Healthy,
    // 전송한 모든 요청이 상태 코드를 받지 못함
    Degraded,
    // 요청을 하나도 보내지 않음
    Idle,
}

/// 실행 리포트
#[derive(Debug, Clone)]
pub struct RunReport {
    pub total_events: u64,
    pub steps: BTreeMap<StepKey, StepStats>,
    pub timeline: Vec<ActionEvent>,
    pub dropped_from_timeline: u64,
    pub instances_spawned: u64,
    pub handoffs_delivered: u64,
    pub skipped_handoffs: u64,
    timeline_capacity: usize,
    responses: u64,
    exceptions: u64,
}

impl RunReport {
    pub fn new(timeline_capacity: usize) -> Self {
        Self {
            total_events: 0,
            steps: BTreeMap::new(),
            timeline: Vec::new(),
            dropped_from_timeline: 0,
            instances_spawned: 0,
            handoffs_delivered: 0,
            skipped_handoffs: 0,
            timeline_capacity,
            responses: 0,
            exceptions: 0,
        }
    }

    pub fn record(&mut self, event: ActionEvent) {
        self.total_events += 1;
        if event.responded {
            self.responses += 1;
        } else if event.was_sent() {
            self.exceptions += 1;
        }
        self.steps
            .entry(StepKey {
                role: event.role,
                step: event.step.clone(),
            })
            .or_default()
            .record(&event);

        if self.timeline.len() < self.timeline_capacity {
            self.timeline.push(event);
        } else {
            self.dropped_from_timeline += 1;
        }
    }

    pub fn health(&self) -> RunHealth {
        if self.responses == 0 && self.exceptions == 0 {
            RunHealth::Idle
        } else if self.responses == 0 {
            RunHealth::Degraded
        } else {
            RunHealth::Healthy
        }
    }

    pub fn stats(&self, role: ActorRole, step: &str) -> Option<&StepStats> {
        self.steps.get(&StepKey {
            role,
            step: step.to_string(),
        })
    }

    /// 한 인스턴스의 이벤트를 발생 순서대로 반환
    pub fn instance_timeline(&self, role: ActorRole, instance_id: u64) -> Vec<&ActionEvent> {
        self.timeline
            .iter()
            .filter(|e| e.role == role && e.instance_id == instance_id)
            .collect()
    }

    /// 요약 로그 출력
    pub fn log_summary(&self) {
        info!(
            "{:<12} --> 총 이벤트 {}건, 인스턴스 {}개, 핸드오프 {}건 (건너뜀 {}건)",
            "Report",
            self.total_events,
            self.instances_spawned,
            self.handoffs_delivered,
            self.skipped_handoffs
        );
        for (key, stats) in &self.steps {
            info!(
                "{:<12} --> {}/{}: total={} success={} failure={} exception={} skipped={} avg={:?} min={:?} max={:?} codes={:?}",
                "Report",
                key.role,
                key.step,
                stats.total,
                stats.success,
                stats.failure,
                stats.exception,
                stats.skipped,
                stats.latency_avg(),
                stats.latency_min,
                stats.latency_max,
                stats.status_codes
            );
        }
        match self.health() {
            RunHealth::Healthy => info!("{:<12} --> 대상 서비스 상태: 정상", "Report"),
            RunHealth::Idle => info!("{:<12} --> 전송된 요청 없음", "Report"),
            RunHealth::Degraded => warn!(
                "{:<12} --> 대상 서비스에 한 번도 도달하지 못했습니다 (degraded)",
                "Report"
            ),
        }
    }
}
