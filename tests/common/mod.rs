#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::broadcast;

use boostlog::{
    client::{ChannelMetadata, ClientError, GroupMetadata, MessagingClient},
    config::TrackerConfig,
    runtime::events::BoostEvent,
    types::{OperationId, OperationStatus},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ChannelMeta,
    GroupMeta,
    Follow(String),
    Add(String),
}

#[derive(Default)]
struct Script {
    ready: bool,
    ready_hangs: bool,
    followers: u64,
    participants: u32,
    capacity: Option<u32>,
    queued_counts: VecDeque<u32>,
    metadata_ok_fetches: Option<usize>,
    metadata_fetches: usize,
    metadata_error: Option<ClientError>,
    failures: HashMap<String, ClientError>,
    hangs: HashSet<String>,
    calls: Vec<(Call, Instant)>,
}

/// Deterministic stand-in for the messaging network.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    pub fn connected() -> Self {
        let client = Self::default();
        {
            let mut s = client.lock();
            s.ready = true;
            s.followers = 10;
            s.participants = 10;
        }
        client
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn with_group(self, participants: u32, capacity: Option<u32>) -> Self {
        {
            let mut s = self.lock();
            s.participants = participants;
            s.capacity = capacity;
        }
        self
    }

    /// Participant counts returned by the next group metadata fetches, in order.
    pub fn queue_group_counts(self, counts: &[u32]) -> Self {
        self.lock().queued_counts.extend(counts.iter().copied());
        self
    }

    /// Metadata fetches after the first `n` fail as unreachable.
    pub fn metadata_ok_for(self, n: usize) -> Self {
        self.lock().metadata_ok_fetches = Some(n);
        self
    }

    /// Error returned by metadata fetches past the `metadata_ok_for` limit.
    pub fn metadata_error(self, err: ClientError) -> Self {
        self.lock().metadata_error = Some(err);
        self
    }

    pub fn hang_ready(self) -> Self {
        self.lock().ready_hangs = true;
        self
    }

    pub fn fail(self, recipient: &str, err: ClientError) -> Self {
        self.lock().failures.insert(recipient.to_string(), err);
        self
    }

    pub fn hang(self, recipient: &str) -> Self {
        self.lock().hangs.insert(recipient.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Call, Instant)> {
        self.lock().calls.clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Follow(r) | Call::Add(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn metadata_allowed(s: &mut Script) -> Result<(), ClientError> {
        s.metadata_fetches += 1;
        match s.metadata_ok_fetches {
            Some(limit) if s.metadata_fetches > limit => Err(s
                .metadata_error
                .clone()
                .unwrap_or_else(|| ClientError::Unreachable("metadata unavailable".into()))),
            _ => Ok(()),
        }
    }

    /// Records `call`; returns the scripted failure and whether to hang.
    fn act(&self, call: Call, recipient: &str) -> (Option<ClientError>, bool) {
        let mut s = self.lock();
        s.calls.push((call, Instant::now()));
        (
            s.failures.get(recipient).cloned(),
            s.hangs.contains(recipient),
        )
    }
}

#[async_trait]
impl MessagingClient for ScriptedClient {
    async fn is_ready(&self) -> bool {
        let (ready, hangs) = {
            let s = self.lock();
            (s.ready, s.ready_hangs)
        };
        if hangs {
            std::future::pending::<()>().await;
        }
        ready
    }

    async fn fetch_channel_metadata(&self, _target: &str) -> Result<ChannelMetadata, ClientError> {
        let mut s = self.lock();
        s.calls.push((Call::ChannelMeta, Instant::now()));
        Self::metadata_allowed(&mut s)?;
        Ok(ChannelMetadata {
            name: "Daily News".into(),
            follower_count: s.followers,
        })
    }

    async fn fetch_group_metadata(&self, _target: &str) -> Result<GroupMetadata, ClientError> {
        let mut s = self.lock();
        s.calls.push((Call::GroupMeta, Instant::now()));
        Self::metadata_allowed(&mut s)?;
        let participant_count = s.queued_counts.pop_front().unwrap_or(s.participants);
        Ok(GroupMetadata {
            subject: "Team".into(),
            participant_count,
            capacity: s.capacity,
        })
    }

    async fn follow_channel(&self, _target: &str, recipient: &str) -> Result<(), ClientError> {
        let (failure, hang) = self.act(Call::Follow(recipient.to_string()), recipient);
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(err) = failure {
            return Err(err);
        }
        self.lock().followers += 1;
        Ok(())
    }

    async fn add_group_participant(&self, _target: &str, recipient: &str) -> Result<(), ClientError> {
        let (failure, hang) = self.act(Call::Add(recipient.to_string()), recipient);
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(err) = failure {
            return Err(err);
        }
        self.lock().participants += 1;
        Ok(())
    }
}

pub fn fast_config() -> TrackerConfig {
    TrackerConfig {
        channel_batch_size: 2,
        channel_delay: Duration::from_millis(1),
        group_delay: Duration::from_millis(1),
        call_timeout: Duration::from_millis(200),
        ..TrackerConfig::default()
    }
}

pub fn recipients(list: &[&str]) -> Vec<String> {
    list.iter().map(|r| r.to_string()).collect()
}

pub async fn next_event(rx: &mut broadcast::Receiver<BoostEvent>) -> BoostEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event timeout")
        .expect("recv")
}

pub async fn wait_finished(
    rx: &mut broadcast::Receiver<BoostEvent>,
    id: OperationId,
) -> OperationStatus {
    loop {
        if let BoostEvent::Finished { id: done, status } = next_event(rx).await {
            if done == id {
                return status;
            }
        }
    }
}

pub async fn wait_progress(rx: &mut broadcast::Receiver<BoostEvent>, id: OperationId, completed: usize) {
    loop {
        if let BoostEvent::Progress(p) = next_event(rx).await {
            if p.operation_id == id && p.completed >= completed {
                return;
            }
        }
    }
}
