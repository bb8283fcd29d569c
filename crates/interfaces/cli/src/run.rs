//! The `outreach run` command: resolve models, build the run context, wire
//! the stop signal, launch the browser, and drive the coordinator.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use outreach_audit::{EventLog, Metrics, RunEvent};
use outreach_browser::{BrowserDriver, ChromeDriver, ChromeDriverConfig};
use outreach_config::{AppConfig, Credentials, PlannerMode, RunInputs};
use outreach_engine::DecisionEngine;
use outreach_llm::{LlmClient, resolve_models};
use outreach_runtime::{Coordinator, RunEndReason, StopSignal, TokioClock};
use outreach_store::{QuotaStore, SeenStore};

pub fn api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty())
}

fn read_input(label: &str, path: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("reading {label} from {path}"))
}

pub async fn execute(config: AppConfig) -> Result<u8> {
    if let Err(err) = config.validate() {
        eprintln!("configuration error: {err}");
        return Ok(super::EXIT_CONFIG);
    }

    let Some(api_key) = api_key() else {
        eprintln!("configuration error: OPENAI_API_KEY is not set");
        return Ok(super::EXIT_CONFIG);
    };

    let inputs = {
        let self_profile = read_input("self profile", &config.inputs.self_profile_path);
        let criteria = read_input("match criteria", &config.inputs.criteria_path);
        let template = read_input("message template", &config.inputs.template_path);
        match (self_profile, criteria, template) {
            (Ok(self_profile), Ok(criteria), Ok(template)) => RunInputs {
                self_profile,
                criteria,
                template,
            },
            (a, b, c) => {
                for err in [a.err(), b.err(), c.err()].into_iter().flatten() {
                    eprintln!("configuration error: {err:#}");
                }
                return Ok(super::EXIT_CONFIG);
            }
        }
    };

    let client = LlmClient::new(&config.llm.base_url, api_key);
    let want_cua = config.browser.planner_mode == PlannerMode::PlannerExecutor;
    let resolved = resolve_models(
        &client,
        &config.llm.decision_model,
        &config.llm.cua_model,
        want_cua,
    )
    .await
    .context("resolving models from the provider catalog")?;

    let ctx = match config.resolve(
        inputs,
        resolved.decision_model.clone(),
        resolved.cua_model.clone(),
    ) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return Ok(super::EXIT_CONFIG);
        }
    };

    let data_dir = Path::new(&config.storage.data_dir);
    let seen = Arc::new(SeenStore::open(data_dir.join("seen.redb"))?);
    let quota = Arc::new(QuotaStore::open(
        data_dir.join("quota.redb"),
        config.run.daily_quota,
        config.run.weekly_quota,
    )?);
    let log = Arc::new(EventLog::new(data_dir.join("events.jsonl"), ctx.run_id));

    log.emit(RunEvent::ModelsResolved {
        decision_model: resolved.decision_model.clone(),
        cua_model: resolved.cua_model.clone(),
    })
    .await;

    // Ctrl-C sets the cooperative stop; a second Ctrl-C force-exits.
    let stop = StopSignal::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("stop requested — finishing the current step");
                stop.set();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("second interrupt — exiting immediately");
                std::process::exit(130);
            }
        });
    }

    let planner = (want_cua && ctx.cua_model.is_some()).then(|| {
        (
            client.clone(),
            ctx.cua_model.clone().unwrap_or_default(),
            config.browser.planner_max_turns,
            Duration::from_secs(config.browser.planner_turn_timeout_secs),
        )
    });
    let driver = ChromeDriver::launch(
        ChromeDriverConfig {
            headless: config.browser.headless,
            selectors: config.selectors.clone(),
            operation_timeout: Duration::from_secs(config.browser.operation_timeout_secs),
            verify_window: Duration::from_secs(config.browser.verify_window_secs),
            credentials: Credentials::from_env(),
            planner,
        },
        stop.checker(),
    )
    .await
    .context("launching browser")?;
    let driver: Arc<dyn BrowserDriver> = Arc::new(driver);

    let coordinator = Coordinator {
        driver: driver.clone(),
        evaluator: Arc::new(DecisionEngine::new(client)),
        seen,
        quota,
        log,
        metrics: Arc::new(Metrics::new()),
        clock: Arc::new(TokioClock::new()),
        stop,
        template_config: config.template.clone(),
    };

    let report = coordinator.run(&ctx).await;
    if let Err(err) = driver.close().await {
        tracing::warn!(error = %err, "browser close failed");
    }
    let report = report?;

    let summary = &report.summary;
    println!("run finished: {}", report.reason.as_str());
    println!(
        "  scanned {}  extracted {}  duplicates {}  yes {}  no {}  error {}",
        summary.profiles_scanned,
        summary.profiles_extracted,
        summary.duplicates,
        summary.decisions_yes,
        summary.decisions_no,
        summary.decisions_error,
    );
    println!(
        "  sent {}  failed {}  shadow {}  pending {}",
        summary.sends_ok, summary.sends_failed, summary.shadow_sends, summary.pending_approvals,
    );

    Ok(match report.reason {
        RunEndReason::LoginRequired => super::EXIT_LOGIN_REQUIRED,
        RunEndReason::Quota if summary.sends_ok == 0 => super::EXIT_QUOTA_NO_SENDS,
        _ => super::EXIT_OK,
    })
}
