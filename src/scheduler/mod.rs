/// 부하 스케줄러
/// 1. 역할별 인구 수만큼 인스턴스를 생성 속도에 맞춰 순차 투입
/// 2. 핸드오프 채널로 들어온 인스턴스를 동시 실행 제한 안에서 실행
/// 3. 실행 시간 만료 또는 정지 신호 시 새 턴을 막고, 진행 중인 스텝은 끝까지 기다린다
/// 4. 모든 인스턴스가 끝나면 이벤트 수집기를 닫고 리포트를 반환
// region:    --- Imports
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::action::Transport;
use crate::actor::{ActorRole, ActorState, InstanceContext, InstanceSummary, Roster, ThinkTime};
use crate::event_sink::{self, RunReport};
use crate::handoff::{HandoffChannel, HandoffMessage, HandoffPayload};

// endregion: --- Imports

// region:    --- Scheduler Config
const MIN_SPAWN_PERIOD: Duration = Duration::from_millis(1);

/// 도착 프로파일과 실행 제한
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// 역할별 인구 수
    pub population: Vec<(ActorRole, u32)>,
    /// 초당 투입 인스턴스 수
    pub spawn_rate: f64,
    pub think_time: ThinkTime,
    pub run_duration: Option<Duration>,
    pub max_turns: Option<u32>,
    /// 끝난 인구 인스턴스를 같은 역할로 다시 투입
    pub respawn: bool,
    pub max_handoff_instances: usize,
    /// 실행 대기 중인 핸드오프 최대 수 (넘치면 건너뜀으로 집계)
    pub handoff_queue_capacity: usize,
    pub timeline_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            population: vec![(ActorRole::Seller, 1)],
            spawn_rate: 1.0,
            think_time: ThinkTime::new(Duration::from_millis(1000), Duration::from_millis(3000)),
            run_duration: None,
            max_turns: None,
            respawn: true,
            max_handoff_instances: 64,
            handoff_queue_capacity: 1024,
            timeline_capacity: 10_000,
        }
    }
}

impl SchedulerConfig {
    /// 역할을 번갈아 가며 투입 순서 생성 (예: 판매자 2, 구매자 1 → S, B, S)
    pub fn arrival_order(&self) -> VecDeque<ActorRole> {
        let mut remaining = self.population.clone();
        let mut order = VecDeque::new();
        while remaining.iter().any(|(_, count)| *count > 0) {
            for (role, count) in remaining.iter_mut() {
                if *count > 0 {
                    order.push_back(*role);
                    *count -= 1;
                }
            }
        }
        order
    }

    /// 투입 간격 (최소 1ms)
    pub fn spawn_period(&self) -> Duration {
        if self.spawn_rate.is_finite() && self.spawn_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.spawn_rate).max(MIN_SPAWN_PERIOD)
        } else {
            Duration::from_secs(1)
        }
    }
}
// endregion: --- Scheduler Config

// region:    --- Stop Handle
/// 실행 중인 스케줄러를 멈추는 핸들
#[derive(Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        if !self.sender.send_replace(true) {
            info!("{:<12} --> 정지 요청", "Scheduler");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }
}
// endregion: --- Stop Handle

// region:    --- Load Scheduler
enum Origin {
    Population,
    // 핸드오프 인스턴스는 끝날 때까지 실행 슬롯을 점유
    Handoff(OwnedSemaphorePermit),
}

pub struct LoadScheduler {
    config: SchedulerConfig,
    roster: Roster,
    transport: Arc<dyn Transport>,
    stop: Arc<watch::Sender<bool>>,
}

impl LoadScheduler {
    pub fn new(config: SchedulerConfig, roster: Roster, transport: Arc<dyn Transport>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            config,
            roster,
            transport,
            stop: Arc::new(stop),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            sender: Arc::clone(&self.stop),
        }
    }

    /// 실행 후 리포트 반환
    pub async fn run(self) -> RunReport {
        let Self {
            config,
            roster,
            transport,
            stop: stop_tx,
        } = self;

        let (sink, collector) = event_sink::channel(config.timeline_capacity);
        let collector = tokio::spawn(collector.run());
        let (handoffs, mut handoff_rx) = HandoffChannel::open();
        let ctx = InstanceContext {
            transport,
            sink: Arc::new(sink),
            handoffs,
            roster: roster.clone(),
            think_time: config.think_time,
            max_turns: config.max_turns,
            stop: stop_tx.subscribe(),
        };

        let mut stop = stop_tx.subscribe();
        let mut stopped = *stop.borrow_and_update();
        let mut arrivals = config.arrival_order();
        arrivals.retain(|role| {
            let known = roster.contains(*role);
            if !known {
                warn!("{:<12} --> {} 스크립트가 없어 투입하지 않습니다", "Scheduler", role);
            }
            known
        });
        let permits = Arc::new(Semaphore::new(config.max_handoff_instances.max(1)));
        let mut waiting: VecDeque<HandoffPayload> = VecDeque::new();
        let mut tasks: JoinSet<(Origin, InstanceSummary)> = JoinSet::new();
        let mut tally = HandoffTally {
            queue_capacity: config.handoff_queue_capacity,
            ..HandoffTally::default()
        };

        let mut ticker = interval(config.spawn_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 실행 시간이 없으면 deadline 분기는 비활성
        let deadline = sleep(config.run_duration.unwrap_or(Duration::MAX));
        tokio::pin!(deadline);
        let timed = config.run_duration.is_some();
        let started = Instant::now();

        info!(
            "{:<12} --> 시작: 인구 {:?}, 투입 속도 {}/s, 실행 시간 {:?}",
            "Scheduler", config.population, config.spawn_rate, config.run_duration
        );

        loop {
            while let Ok(message) = handoff_rx.try_recv() {
                tally.on_message(message, stopped, &mut waiting);
            }
            if stopped {
                if !arrivals.is_empty() || !waiting.is_empty() {
                    info!(
                        "{:<12} --> 정지: 투입 대기 {}개, 핸드오프 대기 {}개 취소",
                        "Scheduler",
                        arrivals.len(),
                        waiting.len()
                    );
                }
                arrivals.clear();
                waiting.clear();
            }
            while !waiting.is_empty() {
                let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                    break;
                };
                let Some(payload) = waiting.pop_front() else {
                    break;
                };
                let target = payload.target;
                match roster.spawn(target, payload.into_state()) {
                    Some(instance) => {
                        let ctx = ctx.clone();
                        tasks.spawn(async move {
                            let summary = instance.run(&ctx).await;
                            (Origin::Handoff(permit), summary)
                        });
                    }
                    None => {
                        warn!(
                            "{:<12} --> {} 스크립트가 없어 핸드오프를 건너뜁니다",
                            "Scheduler", target
                        );
                        tally.skipped += 1;
                    }
                }
            }
            if tasks.is_empty() && arrivals.is_empty() && waiting.is_empty() {
                break;
            }

            tokio::select! {
                _ = ticker.tick(), if !stopped && !arrivals.is_empty() => {
                    if let Some(role) = arrivals.pop_front() {
                        if let Some(instance) = roster.spawn(role, ActorState::new()) {
                            let ctx = ctx.clone();
                            tasks.spawn(async move {
                                let summary = instance.run(&ctx).await;
                                (Origin::Population, summary)
                            });
                        }
                    }
                }
                Some(message) = handoff_rx.recv() => {
                    tally.on_message(message, stopped, &mut waiting);
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok((origin, summary)) => {
                        debug!(
                            "{:<12} --> {}#{} 종료: {:?}",
                            "Scheduler", summary.role, summary.instance_id, summary.termination
                        );
                        if matches!(origin, Origin::Population) && config.respawn && !stopped {
                            arrivals.push_back(summary.role);
                        }
                    }
                    Err(e) => error!("{:<12} --> 인스턴스 태스크 실패: {:?}", "Scheduler", e),
                },
                _ = &mut deadline, if timed && !stopped => {
                    info!("{:<12} --> 실행 시간 만료 ({:?})", "Scheduler", started.elapsed());
                    stop_tx.send_replace(true);
                    stopped = true;
                }
                Ok(()) = stop.changed(), if !stopped => {
                    stopped = *stop.borrow_and_update();
                }
            }
        }

        drop(ctx);
        drop(handoff_rx);
        let mut report = match collector.await {
            Ok(report) => report,
            Err(e) => {
                error!("{:<12} --> 이벤트 수집기 실패: {:?}", "Scheduler", e);
                RunReport::new(config.timeline_capacity)
            }
        };
        report.instances_spawned = roster.spawned();
        report.handoffs_delivered = tally.delivered;
        report.skipped_handoffs = tally.skipped;
        info!("{:<12} --> 종료 ({:?})", "Scheduler", started.elapsed());
        report.log_summary();
        report
    }
}

#[derive(Default)]
struct HandoffTally {
    delivered: u64,
    skipped: u64,
    queue_capacity: usize,
}

impl HandoffTally {
    fn on_message(
        &mut self,
        message: HandoffMessage,
        stopped: bool,
        waiting: &mut VecDeque<HandoffPayload>,
    ) {
        match message {
            HandoffMessage::Deliver(payload) => {
                if stopped {
                    self.delivered += 1;
                } else if waiting.len() >= self.queue_capacity {
                    warn!(
                        "{:<12} --> 핸드오프 대기열이 가득 차 {}#{} 의 핸드오프를 건너뜁니다",
                        "Scheduler", payload.source_role, payload.source_instance
                    );
                    self.skipped += 1;
                } else {
                    self.delivered += 1;
                    waiting.push_back(payload);
                }
            }
            HandoffMessage::RanInline { .. } => self.delivered += 1,
            HandoffMessage::Skipped { .. } => self.skipped += 1,
        }
    }
}
// endregion: --- Load Scheduler

// endregion: --- Tests
