//! Request/response loop between a front end and [`Lottery`].
//!
//! Every request carries a `oneshot` reply. Store requests are answered in
//! order on the loop; batch requests run on their own task so the loop keeps
//! serving while a run is in progress. Failures are logged and answered with
//! `false`, `None` or an empty list.

use std::sync::Arc;

use chrono::{Datelike, Local};
use courtlot_core::{LotterySetting, Member, Progress, TargetSpec};
use courtlot_dispatch::{ProgressFn, StatusReport, Tally};
use courtlot_store::Profile;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::Lottery;

pub type Reply<T> = oneshot::Sender<T>;

/// Queue depth of the channel returned by [`spawn`].
const REQUEST_BUFFER: usize = 32;

#[derive(Debug)]
pub enum Request {
    LoadProfiles {
        reply: Reply<Vec<Profile>>,
    },
    SaveProfiles {
        profiles: Vec<Profile>,
        reply: Reply<bool>,
    },
    DeleteProfile {
        profile_id: String,
        reply: Reply<bool>,
    },
    LoadMembers {
        profile_id: String,
        reply: Reply<Vec<Member>>,
    },
    SaveMembers {
        profile_id: String,
        members: Vec<Member>,
        reply: Reply<bool>,
    },
    LoadLotterySetting {
        profile_id: String,
        reply: Reply<Option<LotterySetting>>,
    },
    SaveLotterySetting {
        profile_id: String,
        setting: LotterySetting,
        reply: Reply<bool>,
    },
    /// Apply for the profile's members over `targets`. The month comes from
    /// the profile's saved setting, or the first target's date without one.
    RunLottery {
        profile_id: String,
        targets: Vec<TargetSpec>,
        report_progress: bool,
        progress: Option<mpsc::Sender<Progress>>,
        reply: Reply<bool>,
    },
    GetApplicationStatus {
        profile_id: String,
        progress: Option<mpsc::Sender<Progress>>,
        reply: Reply<Option<StatusReport>>,
    },
    ConfirmLotteryResult {
        profile_id: String,
        progress: Option<mpsc::Sender<Progress>>,
        reply: Reply<bool>,
    },
}

/// Start [`serve`] on its own task and return the request sender.
pub fn spawn(lottery: Arc<Lottery>) -> mpsc::Sender<Request> {
    let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
    tokio::spawn(serve(lottery, rx));
    tx
}

/// Answer requests until every sender is dropped.
pub async fn serve(lottery: Arc<Lottery>, mut requests: mpsc::Receiver<Request>) {
    info!("service started");
    while let Some(request) = requests.recv().await {
        handle(&lottery, request);
    }
    info!("service stopped");
}

fn handle(lottery: &Arc<Lottery>, request: Request) {
    let data = lottery.data();
    match request {
        Request::LoadProfiles { reply } => {
            let profiles = data.load_profiles().unwrap_or_else(|e| {
                error!(error = %e, "load profiles failed");
                Vec::new()
            });
            answer(reply, profiles);
        }
        Request::SaveProfiles { profiles, reply } => {
            answer(reply, report("save profiles", data.save_profiles(&profiles)));
        }
        Request::DeleteProfile { profile_id, reply } => {
            let result = data.delete_profile(&profile_id);
            answer(reply, report("delete profile", result));
        }
        Request::LoadMembers { profile_id, reply } => {
            let members = data.load_members(&profile_id).unwrap_or_else(|e| {
                error!(profile = %profile_id, error = %e, "load members failed");
                Vec::new()
            });
            answer(reply, members);
        }
        Request::SaveMembers {
            profile_id,
            members,
            reply,
        } => {
            let result = data.save_members(&profile_id, &members);
            answer(reply, report("save members", result));
        }
        Request::LoadLotterySetting { profile_id, reply } => {
            let setting = data.load_lottery_setting(&profile_id).unwrap_or_else(|e| {
                error!(profile = %profile_id, error = %e, "load lottery setting failed");
                None
            });
            answer(reply, setting);
        }
        Request::SaveLotterySetting {
            profile_id,
            setting,
            reply,
        } => {
            let result = data.save_lottery_setting(&profile_id, &setting);
            answer(reply, report("save lottery setting", result));
        }
        Request::RunLottery {
            profile_id,
            targets,
            report_progress,
            progress,
            reply,
        } => {
            let lottery = lottery.clone();
            let progress = progress.filter(|_| report_progress).map(forward);
            tokio::spawn(async move {
                let ok = run_lottery(&lottery, &profile_id, targets, progress).await;
                answer(reply, ok);
            });
        }
        Request::GetApplicationStatus {
            profile_id,
            progress,
            reply,
        } => {
            let lottery = lottery.clone();
            tokio::spawn(async move {
                let status = lottery
                    .application_status(&profile_id, progress.map(forward))
                    .await
                    .map_err(|e| error!(profile = %profile_id, error = %e, "status run failed"))
                    .ok();
                answer(reply, status);
            });
        }
        Request::ConfirmLotteryResult {
            profile_id,
            progress,
            reply,
        } => {
            let lottery = lottery.clone();
            tokio::spawn(async move {
                let ok = match lottery.confirm_results(&profile_id, progress.map(forward)).await {
                    Ok(reports) => Tally::of(&reports).all_succeeded(),
                    Err(e) => {
                        error!(profile = %profile_id, error = %e, "result confirmation failed");
                        false
                    }
                };
                answer(reply, ok);
            });
        }
    }
}

async fn run_lottery(
    lottery: &Lottery,
    profile_id: &str,
    targets: Vec<TargetSpec>,
    progress: Option<ProgressFn>,
) -> bool {
    let saved = lottery
        .data()
        .load_lottery_setting(profile_id)
        .unwrap_or_else(|e| {
            error!(profile = profile_id, error = %e, "load lottery setting failed");
            None
        });
    let month = saved
        .map(|s| s.month)
        .or_else(|| targets.first().map(|t| t.date.month()))
        .unwrap_or_else(|| Local::now().month());
    let setting = LotterySetting { month, targets };

    match lottery.execute_lottery(profile_id, &setting, progress).await {
        Ok(run) => run.succeeded(),
        Err(e) => {
            error!(profile = profile_id, error = %e, "lottery run failed");
            false
        }
    }
}

/// Progress callback pushing into a channel. Events are dropped, not
/// awaited, when the receiver falls behind.
fn forward(tx: mpsc::Sender<Progress>) -> ProgressFn {
    Arc::new(move |progress| {
        if let Err(e) = tx.try_send(progress) {
            debug!(error = %e, "progress event dropped");
        }
    })
}

fn report<E: std::fmt::Display>(what: &str, result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "{what} failed");
            false
        }
    }
}

fn answer<T>(reply: Reply<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("requester went away before the reply");
    }
}
