//! In-Process Collaborators
//!
//! Host stand-ins that keep everything in memory: a shared board that
//! connects several sessions, a dice platform driven by a seeded generator
//! or scripted faces, a recording chat and a fixed identity. Used by the
//! demo binary and the tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::expr::InitiativeExpression;
use crate::core::rng::DeterministicRng;
use crate::dice::chain::RollId;
use crate::dice::outcome::ResultGroup;
use super::platform::{
    BusError, ChatChannel, DicePlatform, Identity, IdentityDirectory, PlatformError, PlatformEvent,
    SyncBus,
};
use super::protocol::{Recipients, Sender, SyncMessage};

/// Inbound queue length per member.
const MEMBER_QUEUE: usize = 64;

// =============================================================================
// SYNC BUS
// =============================================================================

struct Member {
    identity: Identity,
    inbox: mpsc::Sender<SyncMessage>,
}

/// Shared board connecting every joined session.
#[derive(Default)]
pub struct LocalBoard {
    members: RwLock<Vec<Member>>,
}

impl LocalBoard {
    /// Empty board.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join with an identity. Returns the sending side and the inbox.
    pub async fn join(self: &Arc<Self>, identity: Identity) -> (BoardConnection, mpsc::Receiver<SyncMessage>) {
        let (tx, rx) = mpsc::channel(MEMBER_QUEUE);
        let sender = Sender {
            client_id: identity.client_id.clone(),
            player_id: identity.player_id.clone(),
            player_name: identity.player_name.clone(),
        };

        debug!(client = %identity.client_id, name = %identity.player_name, "joined board");
        self.members.write().await.push(Member { identity, inbox: tx });

        let connection = BoardConnection {
            board: Arc::clone(self),
            sender,
        };
        (connection, rx)
    }

    /// Connected clients.
    pub async fn members(&self) -> Vec<Identity> {
        self.members.read().await.iter().map(|m| m.identity.clone()).collect()
    }

    async fn targets(&self, recipients: &Recipients) -> Vec<mpsc::Sender<SyncMessage>> {
        self.members
            .read()
            .await
            .iter()
            .filter(|m| match recipients {
                Recipients::Board => true,
                Recipients::Gms => m.identity.can_gm,
                Recipients::Clients(ids) => {
                    ids.contains(&m.identity.client_id) || ids.contains(&m.identity.player_id)
                }
            })
            .map(|m| m.inbox.clone())
            .collect()
    }
}

/// One member's sending side.
pub struct BoardConnection {
    board: Arc<LocalBoard>,
    sender: Sender,
}

impl BoardConnection {
    /// Transport identity stamped on every payload.
    pub fn sender(&self) -> &Sender {
        &self.sender
    }
}

impl SyncBus for BoardConnection {
    async fn publish(&self, payload: String, recipients: &Recipients) -> Result<(), BusError> {
        let targets = self.board.targets(recipients).await;
        if targets.is_empty() {
            debug!(?recipients, "no recipients connected");
            return Ok(());
        }

        let message = SyncMessage {
            sender: self.sender.clone(),
            payload,
        };
        // Never waits on a slow reader: a full inbox loses this delivery
        let mut dropped = 0;
        let mut closed = 0;
        for tx in &targets {
            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Closed(_)) => closed += 1,
            }
        }

        if closed == targets.len() {
            return Err(BusError::Closed);
        }
        if dropped > 0 {
            warn!(dropped, "inbox full, delivery dropped");
        }
        if closed > 0 {
            warn!(closed, "some recipients left the board");
        }
        Ok(())
    }
}

// =============================================================================
// DICE PLATFORM
// =============================================================================

/// A roll put in the tray.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// Issued id.
    pub roll_id: RollId,
    /// Label.
    pub label: String,
    /// Dice expression.
    pub expression: String,
}

/// Dice platform rolling with a seeded generator, or with queued faces.
pub struct ScriptedDicePlatform {
    rng: Mutex<DeterministicRng>,
    scripted: Mutex<VecDeque<Vec<u32>>>,
    pending: Mutex<VecDeque<Submission>>,
    shown: Mutex<Vec<Vec<ResultGroup>>>,
    refuse: AtomicBool,
}

impl ScriptedDicePlatform {
    /// Platform rolling with `rng` once the script runs out.
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            scripted: Mutex::new(VecDeque::new()),
            pending: Mutex::new(VecDeque::new()),
            shown: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
        }
    }

    /// Queue the faces of a future roll.
    pub async fn script(&self, faces: Vec<u32>) {
        self.scripted.lock().await.push_back(faces);
    }

    /// Make later submissions fail.
    pub fn refuse_submissions(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Oldest unresolved submission.
    pub async fn next_submission(&self) -> Option<Submission> {
        self.pending.lock().await.pop_front()
    }

    /// Number of unresolved submissions.
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Roll a submission, using scripted faces first.
    pub async fn roll(&self, submission: &Submission) -> PlatformEvent {
        let (count, faces, modifier) = match InitiativeExpression::parse_notation(&submission.expression) {
            Ok(InitiativeExpression::Dice { count, faces, modifier }) => (count, faces, modifier),
            Ok(InitiativeExpression::Flat { value }) => (0, 0, value),
            Err(e) => {
                warn!(expression = %submission.expression, error = %e, "unrollable expression");
                (0, 0, 0)
            }
        };

        let results = match self.scripted.lock().await.pop_front() {
            Some(scripted) => scripted,
            None => {
                let mut rng = self.rng.lock().await;
                (0..count).map(|_| rng.roll_die(faces)).collect()
            }
        };

        let mut group = ResultGroup::d6(submission.label.clone(), results);
        group.modifier = modifier;
        PlatformEvent::RollResults {
            roll_id: submission.roll_id.clone(),
            groups: vec![group],
        }
    }

    /// Groups shown so far.
    pub async fn shown(&self) -> Vec<Vec<ResultGroup>> {
        self.shown.lock().await.clone()
    }
}

impl DicePlatform for ScriptedDicePlatform {
    async fn submit_roll(&self, label: &str, expression: &str) -> Result<RollId, PlatformError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(PlatformError::SubmitFailed("tray unavailable".to_string()));
        }

        let roll_id = Uuid::new_v4().to_string();
        debug!(roll = %roll_id, label, expression, "roll submitted");
        self.pending.lock().await.push_back(Submission {
            roll_id: roll_id.clone(),
            label: label.to_string(),
            expression: expression.to_string(),
        });
        Ok(roll_id)
    }

    async fn show_result(&self, groups: &[ResultGroup]) -> Result<(), PlatformError> {
        self.shown.lock().await.push(groups.to_vec());
        Ok(())
    }
}

// =============================================================================
// CHAT AND IDENTITY
// =============================================================================

/// Chat that keeps every line it was asked to send.
#[derive(Default)]
pub struct RecordingChat {
    lines: Mutex<Vec<(String, Recipients)>>,
}

impl RecordingChat {
    /// Empty chat.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines sent so far.
    pub async fn lines(&self) -> Vec<(String, Recipients)> {
        self.lines.lock().await.clone()
    }
}

impl ChatChannel for RecordingChat {
    async fn send_chat(&self, text: &str, target: &Recipients) -> Result<(), BusError> {
        debug!(?target, text, "chat");
        self.lines.lock().await.push((text.to_string(), target.clone()));
        Ok(())
    }
}

/// Directory that always answers with the same identity.
pub struct StaticDirectory(pub Identity);

impl StaticDirectory {
    /// Identity with a fresh connection id.
    pub fn new(player_name: &str, can_gm: bool) -> Self {
        Self(Identity {
            client_id: Uuid::new_v4().to_string(),
            player_id: format!("player-{}", player_name.to_lowercase()),
            player_name: player_name.to_string(),
            can_gm,
        })
    }
}

impl IdentityDirectory for StaticDirectory {
    async fn whoami(&self) -> Result<Identity, PlatformError> {
        Ok(self.0.clone())
    }
}
