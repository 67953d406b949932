// region:    --- Imports
use auction_load_tester::config::RunConfig;
use auction_load_tester::event_sink::RunHealth;
use tracing::{error, info, warn};

// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 환경 변수에서 실행 설정 로드
    let config = match RunConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{:<12} --> 설정 로드 실패: {}", "Main", e);
            return Err(e.into());
        }
    };

    // 스케줄러 생성
    let scheduler = match config.scheduler() {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("{:<12} --> 스케줄러 생성 실패: {}", "Main", e);
            return Err(e.into());
        }
    };
    info!("{:<12} --> 부하 생성 시작 (Ctrl-C 로 정지)", "Main");

    // Ctrl-C 시 정지 신호
    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("{:<12} --> 시그널 대기 실패: {:?}", "Main", e);
            return;
        }
        info!("{:<12} --> Ctrl-C 수신, 진행 중인 요청을 마무리합니다", "Main");
        stop.stop();
    });

    let report = scheduler.run().await;
    match report.health() {
        RunHealth::Degraded => warn!(
            "{:<12} --> 대상 서비스({})에 연결하지 못했습니다",
            "Main", config.target_host
        ),
        _ => info!("{:<12} --> 부하 생성 종료", "Main"),
    }
    Ok(())
}
// endregion: --- Main
