use chrono::NaiveTime;
use tokio::sync::Mutex;
use tokitask_agent::{prompt::build_plan_request, reconcile::reconcile};
use tokitask_core::{
    agent::ScheduleAgent,
    tasks::{DayTask, UserData, UserDataRepository},
    TokiError,
};
use tracing::{info, instrument, warn};

/// Result of a successful AI sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub tasks: Vec<DayTask>,
    pub free_time: Option<String>,
    pub advice: Option<String>,
}

struct State {
    data: UserData,
    /// Bumped on every committed change.
    revision: u64,
}

/// In-memory view of one user's document plus the only path that writes it.
///
/// Every change is applied to the in-memory copy first and persisted after;
/// if persisting fails the previous snapshot is restored. At most one AI sync
/// runs at a time, and a sync whose base revision is stale is discarded.
pub struct DaySession<R: UserDataRepository> {
    repo: R,
    state: Mutex<State>,
    sync_gate: Mutex<()>,
}

impl<R: UserDataRepository> DaySession<R> {
    pub async fn open(repo: R) -> Result<Self, TokiError> {
        let data = repo.load().await?;
        Ok(Self {
            repo,
            state: Mutex::new(State { data, revision: 0 }),
            sync_gate: Mutex::new(()),
        })
    }

    pub async fn snapshot(&self) -> UserData {
        self.state.lock().await.data.clone()
    }

    pub async fn revision(&self) -> u64 {
        self.state.lock().await.revision
    }

    /// Apply `mutation` optimistically and persist it.
    pub async fn apply<T, F>(&self, mutation: F) -> Result<T, TokiError>
    where
        F: FnOnce(&mut UserData) -> Result<T, TokiError>,
    {
        let mut state = self.state.lock().await;
        let previous = state.data.clone();
        let output = match mutation(&mut state.data) {
            Ok(output) => output,
            Err(err) => {
                state.data = previous;
                return Err(err);
            }
        };
        self.persist(&mut state, previous).await?;
        Ok(output)
    }

    /// Build, call, merge, commit.
    #[instrument(skip_all, fields(agent = agent.name(), %now))]
    pub async fn sync_schedule(
        &self,
        agent: &dyn ScheduleAgent,
        now: NaiveTime,
    ) -> Result<SyncOutcome, TokiError> {
        let _in_flight = self.sync_gate.try_lock().map_err(|_| TokiError::Busy)?;

        let (base, base_revision) = {
            let state = self.state.lock().await;
            (state.data.clone(), state.revision)
        };

        let request = build_plan_request(&base.day_tasks, base.end_of_day_time()?, now)?;
        info!(
            pending = request.context.pending.len(),
            available = request.context.available_minutes,
            "requesting schedule"
        );
        let reply = agent.plan(request).await?;
        let plan = reconcile(&base.day_tasks, reply)?;

        let mut state = self.state.lock().await;
        if state.revision != base_revision {
            warn!(
                base_revision,
                current = state.revision,
                "discarding schedule computed from stale tasks"
            );
            return Err(TokiError::Conflict);
        }
        let previous = state.data.clone();
        state.data.day_tasks = plan.tasks.clone();
        self.persist(&mut state, previous).await?;

        info!(tasks = plan.tasks.len(), "schedule committed");
        Ok(SyncOutcome {
            tasks: plan.tasks,
            free_time: plan.free_time,
            advice: plan.advice,
        })
    }

    async fn persist(&self, state: &mut State, previous: UserData) -> Result<(), TokiError> {
        if let Err(err) = self.repo.save(&state.data).await {
            warn!(error = %err, "persist failed, restoring previous state");
            state.data = previous;
            return Err(err);
        }
        state.revision += 1;
        Ok(())
    }
}
