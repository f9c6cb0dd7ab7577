#![allow(clippy::similar_names)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
mod config;
mod flight_control;
mod logger;
mod mission;
mod publish;
mod report;
mod sim;
mod telemetry;

use crate::config::RunnerConfig;
use crate::flight_control::{
    bridge::BridgeLink,
    link::{CommandError, FlightLink},
};
use crate::mission::runner::MissionRunner;
use crate::publish::JsonLinesPublisher;
use crate::report::{FlightJob, HttpJobClient, JobClient, JobStatus, MachineStatus};
use std::{future::Future, sync::Arc};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let config = RunnerConfig::from_env();
    info!(
        "Starting up as machine '{}' against planner {}.",
        config.machine_name, config.planner_base_url
    );

    let jobs = Arc::new(HttpJobClient::new(&config.planner_base_url, &config.machine_name));
    if let Err(e) = jobs.register_machine().await {
        fatal!("Could not register with the planner backend: {e}");
    }
    let runner = MissionRunner::from_config(&config);

    loop {
        match jobs.next_assigned_job().await {
            Ok(Some(job)) => {
                let bridge_addr = config.bridge_addr.clone();
                let connect = move || async move {
                    let link = BridgeLink::connect(&bridge_addr).await?;
                    Ok(Arc::new(link) as Arc<dyn FlightLink>)
                };
                process_job(&config, jobs.as_ref(), &runner, job, connect).await;
            }
            Ok(None) => {}
            Err(e) => warn!("Job poll failed: {e}"),
        }
        tokio::time::sleep(config.job_poll_interval).await;
    }
}

/// Flies one assigned job and reports the outcome. Every exit path leaves
/// the backend with a final job status and this machine back in a known
/// state.
async fn process_job<C, Fut>(
    config: &RunnerConfig,
    jobs: &dyn JobClient,
    runner: &MissionRunner,
    job: FlightJob,
    connect: C,
) where
    C: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<dyn FlightLink>, CommandError>>,
{
    let mission_id = job.id.to_string();
    info!("Processing flight plan {mission_id}.");
    report_or_warn(jobs.update_job_status(job.id, JobStatus::Processing, None).await);
    report_or_warn(jobs.update_machine_status(MachineStatus::Busy).await);

    let plan_path = config.plan_dir.join(format!("{mission_id}.plan"));
    let telemetry_path = config.log_dir.join(format!("{mission_id}_telemetry.jsonl"));
    let outcome = async {
        tokio::fs::create_dir_all(&config.plan_dir).await?;
        tokio::fs::write(&plan_path, &job.file_content).await?;
        tokio::fs::create_dir_all(&config.log_dir).await?;
        let publisher = JsonLinesPublisher::create(&telemetry_path).await?;
        Ok::<_, std::io::Error>(Arc::new(publisher))
    }
    .await;

    let publisher = match outcome {
        Ok(publisher) => publisher,
        Err(e) => {
            error!("Could not set up artifacts for plan {mission_id}: {e}");
            report_or_warn(jobs.update_job_status(job.id, JobStatus::Error, None).await);
            report_or_warn(jobs.update_machine_status(MachineStatus::Error).await);
            return;
        }
    };

    match runner.run(&mission_id, &plan_path, connect, publisher).await {
        Ok(log_path) => match tokio::fs::read_to_string(&log_path).await {
            Ok(log_content) => {
                info!("Flight plan {mission_id} processed.");
                report_or_warn(
                    jobs.update_job_status(job.id, JobStatus::Processed, Some(log_content)).await,
                );
                report_or_warn(jobs.update_machine_status(MachineStatus::Available).await);
                cleanup(&plan_path).await;
                cleanup(&log_path).await;
                cleanup(&telemetry_path).await;
            }
            Err(e) => {
                error!("Flight log for plan {mission_id} is unreadable: {e}");
                report_or_warn(jobs.update_job_status(job.id, JobStatus::Error, None).await);
                report_or_warn(jobs.update_machine_status(MachineStatus::Error).await);
            }
        },
        Err(e) => {
            error!("Flight plan {mission_id} failed: {e}");
            report_or_warn(jobs.update_job_status(job.id, JobStatus::Error, None).await);
            report_or_warn(jobs.update_machine_status(MachineStatus::Error).await);
        }
    }
}

fn report_or_warn(result: Result<(), report::ReportError>) {
    if let Err(e) = result {
        warn!("Status report to the planner backend failed: {e}");
    }
}

async fn cleanup(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Could not remove {}: {e}", path.display());
    }
}
