//! Helm Session
//!
//! One client's view of the table. The session owns the dice registry, the
//! roll engine, the initiative scheduler and the throw log, and wires them to
//! the host collaborators: it submits rolls, turns platform callbacks into
//! outcomes, routes inbound sync payloads and publishes outbound envelopes.
//!
//! Every suspension point is a call into a collaborator. No lock is held
//! across one, so a callback for another roll may be processed while a
//! reroll submission is still pending.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::HelmConfig;
use crate::core::damage::Severity;
use crate::core::expr::{ExpressionError, InitiativeExpression};
use crate::dice::chain::{ChainId, RollId};
use crate::dice::engine::{Resolution, RerollRequest, RollEngine, ThrowError, ThrowRequest};
use crate::dice::outcome::{reroll_note, ResultGroup, RollOutcome};
use crate::dice::registry::{DiceSetConfig, DiceSetRegistry, RegistryError, Role};
use crate::initiative::scheduler::{
    ConditionRow, InitiativeEntry, InitiativeScheduler, SchedulerError, TurnSlot,
};
use crate::initiative::table::{InitiativeTable, TurnHint};
use crate::storage::{PersonalInitiative, Profile, ProfileError, ProfileStore};
use super::log::{LogEntry, ThrowLog};
use super::platform::{
    BusError, ChatChannel, DicePlatform, Identity, IdentityDirectory, PlatformError, PlatformEvent,
    SyncBus,
};
use super::protocol::{
    encode, DiceLog, Envelope, FetchInitiative, InitiativeReport, ProtocolError, Recipients,
    SetInitiative, Sender, SyncMessage, ThrowAssignment,
};
use super::router::{Dispatch, SyncRouter};

/// Label prefix of own initiative rolls.
pub const INITIATIVE_LABEL_PREFIX: &str = "Initiative:";

/// Reply to the `help!` chat command.
pub const HELP_TEXT: &str = "Roll ini:  ri!";

// =============================================================================
// EVENTS AND ERRORS
// =============================================================================

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum HelmEvent {
    /// Short message for the user.
    Notice(String),
    /// A throw finished.
    RollResolved(RollOutcome),
    /// Exploded dice are being rolled again.
    RerollRequested {
        /// Chain waiting for the reroll.
        chain_id: ChainId,
        /// Dice rerolled.
        count: u32,
    },
    /// Throw log grew.
    LogAppended(LogEntry),
    /// A new initiative table arrived.
    InitiativeTableReplaced {
        /// The table.
        table: InitiativeTable,
        /// Where the local participant stands.
        hint: TurnHint,
    },
    /// A GM added a dice set.
    ThrowAssigned {
        /// List it went to.
        role: Role,
        /// Position in that list.
        index: usize,
        /// The set.
        set: DiceSetConfig,
    },
    /// Own initiative was rolled.
    InitiativeRolled {
        /// Participant.
        name: String,
        /// Dice plus modifier.
        total: u32,
    },
    /// Glitch effect requested.
    Glitch {
        /// Effect command.
        command: String,
    },
    /// Hacking minigame started.
    HackStarted {
        /// Difficulty.
        difficulty: u32,
        /// Allowed attempts.
        attempts: u32,
    },
    /// Hacking minigame ended.
    HackEnded {
        /// Solved.
        success: bool,
    },
}

/// Session errors.
#[derive(Debug, Error)]
pub enum HelmError {
    /// Throw rejected.
    #[error("throw rejected: {0}")]
    Throw(#[from] ThrowError),

    /// Dice set lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Initiative list change rejected.
    #[error("initiative: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Malformed initiative expression.
    #[error("initiative: {0}")]
    Expression(#[from] ExpressionError),

    /// Dice platform failure.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Sync bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Envelope could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Profile load/save failure.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Input rejected before anything was sent.
    #[error("{0}")]
    Validation(String),
}

/// Kind of throw a GM hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrowKind {
    /// Offensive throw.
    Offense,
    /// Open throw, threshold and damage are cleared by the receiver.
    Open,
    /// Defence throw.
    Defence,
}

impl ThrowKind {
    fn envelope(self, assignment: ThrowAssignment) -> Envelope {
        match self {
            ThrowKind::Offense => Envelope::Offense(assignment),
            ThrowKind::Open => Envelope::Open(assignment),
            ThrowKind::Defence => Envelope::Defence(assignment),
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A connected client.
pub struct CombatHelm<P, B, C> {
    identity: Identity,
    router: SyncRouter,
    platform: Arc<P>,
    bus: Arc<B>,
    chat: Arc<C>,
    gm_mode: AtomicBool,
    log_capacity: usize,
    registry: RwLock<DiceSetRegistry>,
    engine: Mutex<RollEngine>,
    initiative_rolls: Mutex<HashSet<RollId>>,
    scheduler: Mutex<InitiativeScheduler>,
    table: RwLock<InitiativeTable>,
    personal: RwLock<Option<PersonalInitiative>>,
    log: RwLock<ThrowLog>,
    events: mpsc::Sender<HelmEvent>,
}

impl<P, B, C> CombatHelm<P, B, C>
where
    P: DicePlatform,
    B: SyncBus,
    C: ChatChannel,
{
    /// Resolve the local identity and build the session.
    pub async fn connect<D: IdentityDirectory>(
        config: &HelmConfig,
        directory: &D,
        platform: Arc<P>,
        bus: Arc<B>,
        chat: Arc<C>,
    ) -> Result<(Self, mpsc::Receiver<HelmEvent>), HelmError> {
        let identity = directory.whoami().await?;
        let (events, rx) = mpsc::channel(config.event_buffer.max(1));

        info!(
            player = %identity.player_name,
            gm = identity.can_gm,
            gm_mode = config.gm_mode,
            "helm connected"
        );

        let helm = Self {
            router: SyncRouter::new(identity.can_gm),
            scheduler: Mutex::new(InitiativeScheduler::new(config.rng(&identity.player_id))),
            identity,
            platform,
            bus,
            chat,
            gm_mode: AtomicBool::new(config.gm_mode),
            log_capacity: config.log_capacity,
            registry: RwLock::new(DiceSetRegistry::new()),
            engine: Mutex::new(RollEngine::new(config.avoid_unneeded_explosion)),
            initiative_rolls: Mutex::new(HashSet::new()),
            table: RwLock::new(InitiativeTable::default()),
            personal: RwLock::new(None),
            log: RwLock::new(ThrowLog::new(config.log_capacity)),
            events,
        };
        Ok((helm, rx))
    }

    /// Local identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Results go to the GMs only.
    pub fn gm_mode(&self) -> bool {
        self.gm_mode.load(Ordering::SeqCst)
    }

    /// Toggle GM-only output.
    pub fn set_gm_mode(&self, enabled: bool) {
        self.gm_mode.store(enabled, Ordering::SeqCst);
    }

    /// Toggle the explosion shortcut for throws submitted from now on.
    pub async fn set_avoid_unneeded_explosion(&self, enabled: bool) {
        self.engine.lock().await.set_avoid_unneeded_explosion(enabled);
    }

    fn emit(&self, event: HelmEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!(error = %e, "presentation event dropped");
        }
    }

    fn notify(&self, text: impl Into<String>) {
        let text = text.into();
        info!(notice = %text, "notice");
        self.emit(HelmEvent::Notice(text));
    }

    fn announce_target(&self) -> Recipients {
        if self.gm_mode() {
            Recipients::Gms
        } else {
            Recipients::Board
        }
    }

    async fn say(&self, text: &str, target: &Recipients) {
        if let Err(e) = self.chat.send_chat(text, target).await {
            warn!(error = %e, "chat message not sent");
        }
    }

    async fn send(&self, envelope: &Envelope, recipients: &Recipients) -> Result<(), HelmError> {
        let payload = encode(envelope)?;
        debug!(kind = envelope.kind(), ?recipients, "envelope sent");
        self.bus.publish(payload, recipients).await?;
        Ok(())
    }

    async fn send_quietly(&self, envelope: &Envelope, recipients: &Recipients) {
        if let Err(e) = self.send(envelope, recipients).await {
            warn!(kind = envelope.kind(), error = %e, "envelope not sent");
        }
    }

    // -------------------------------------------------------------------------
    // Dice sets
    // -------------------------------------------------------------------------

    /// Snapshot of one list.
    pub async fn dice_sets(&self, role: Role) -> Vec<DiceSetConfig> {
        self.registry.read().await.list(role).to_vec()
    }

    /// Append a dice set; returns its position.
    pub async fn add_dice_set(&self, role: Role, set: DiceSetConfig) -> usize {
        self.registry.write().await.add(role, set)
    }

    /// Replace a dice set.
    pub async fn update_dice_set(&self, role: Role, index: usize, set: DiceSetConfig) -> Result<(), HelmError> {
        Ok(self.registry.write().await.update(role, index, set)?)
    }

    /// Remove a dice set.
    pub async fn remove_dice_set(&self, role: Role, index: usize) -> Result<DiceSetConfig, HelmError> {
        Ok(self.registry.write().await.remove(role, index)?)
    }

    // -------------------------------------------------------------------------
    // Throws
    // -------------------------------------------------------------------------

    /// Throw a configured dice set.
    ///
    /// Validation failures are shown as a notice and returned; nothing is
    /// submitted in that case.
    #[instrument(skip(self))]
    pub async fn submit_throw(&self, role: Role, index: usize) -> Result<ChainId, HelmError> {
        let set = self.registry.read().await.get(role, index).cloned();
        let Some(set) = set else {
            let e = RegistryError::NotFound { role, index };
            self.notify(e.to_string());
            return Err(e.into());
        };

        let prepared = self.engine.lock().await.prepare_throw(role, index, &set);
        match prepared {
            Ok(request) => self.submit(request).await,
            Err(e) => {
                self.notify(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Karma reroll of the dice that did not succeed last time.
    #[instrument(skip(self))]
    pub async fn repeat_last_roll(&self, previous_successes: Option<u32>) -> Result<ChainId, HelmError> {
        let prepared = self.engine.lock().await.repeat_last_roll(previous_successes);
        match prepared {
            Ok(request) => self.submit(request).await,
            Err(e) => {
                self.notify(e.to_string());
                Err(e.into())
            }
        }
    }

    async fn submit(&self, request: ThrowRequest) -> Result<ChainId, HelmError> {
        let roll_id = match self.platform.submit_roll(&request.label(), &request.expression()).await {
            Ok(roll_id) => roll_id,
            Err(e) => {
                self.notify(e.to_string());
                return Err(e.into());
            }
        };
        Ok(self.engine.lock().await.track(request, roll_id))
    }

    /// Unfinished chains.
    pub async fn chains_in_flight(&self) -> usize {
        self.engine.lock().await.in_flight()
    }

    // -------------------------------------------------------------------------
    // Platform callbacks
    // -------------------------------------------------------------------------

    /// Apply one platform notification.
    pub async fn handle_platform_event(&self, event: PlatformEvent) -> Result<(), HelmError> {
        match event {
            PlatformEvent::RollResults { roll_id, groups } => self.handle_roll_results(&roll_id, &groups).await,
            PlatformEvent::RollRemoved { roll_id } => {
                self.handle_roll_removed(&roll_id).await;
                Ok(())
            }
        }
    }

    /// Faces of a roll arrived. Rolls that are not ours are ignored.
    #[instrument(skip(self, groups))]
    pub async fn handle_roll_results(&self, roll_id: &str, groups: &[ResultGroup]) -> Result<(), HelmError> {
        if self.initiative_rolls.lock().await.remove(roll_id) {
            self.evaluate_initiative(groups).await;
            return Ok(());
        }

        let faces: Vec<u32> = groups.iter().flat_map(|g| g.results.iter().copied()).collect();
        let resolution = self.engine.lock().await.apply_result(roll_id, &faces);

        match resolution {
            None => Ok(()),
            Some(Resolution::Reroll(request)) => self.request_reroll(request).await,
            Some(Resolution::Finalized(outcome)) => {
                self.publish_outcome(outcome).await;
                Ok(())
            }
        }
    }

    /// The platform dropped a roll before it resolved.
    pub async fn handle_roll_removed(&self, roll_id: &str) {
        if self.initiative_rolls.lock().await.remove(roll_id) {
            debug!(roll = %roll_id, "initiative roll removed");
            return;
        }
        self.engine.lock().await.on_roll_removed(roll_id);
    }

    async fn request_reroll(&self, request: RerollRequest) -> Result<(), HelmError> {
        self.say(&reroll_note(&request.name, request.count), &self.announce_target()).await;
        self.emit(HelmEvent::RerollRequested {
            chain_id: request.chain_id,
            count: request.count,
        });

        match self.platform.submit_roll(&request.label, &request.expression()).await {
            Ok(roll_id) => {
                if !self.engine.lock().await.attach_reroll(request.chain_id, roll_id) {
                    debug!(chain = %request.chain_id, "chain gone before its reroll was attached");
                }
                Ok(())
            }
            Err(e) => {
                self.engine.lock().await.abandon(request.chain_id);
                self.notify(e.to_string());
                Err(e.into())
            }
        }
    }

    async fn publish_outcome(&self, outcome: RollOutcome) {
        self.notify(outcome.notice());

        if self.gm_mode() {
            self.say(&outcome.chat_message(), &Recipients::Gms).await;
        } else {
            let label = format!("\"{}\"", outcome.name);
            let groups: Vec<ResultGroup> = outcome
                .groups
                .iter()
                .map(|g| ResultGroup { name: label.clone(), ..g.clone() })
                .collect();
            if let Err(e) = self.platform.show_result(&groups).await {
                warn!(error = %e, "result display failed");
            }
            self.say(&outcome.chat_message(), &Recipients::Board).await;
            self.send_quietly(&Envelope::DiceLog(DiceLog::new(outcome.log_line())), &Recipients::Board)
                .await;
        }

        self.emit(HelmEvent::RollResolved(outcome));
    }

    // -------------------------------------------------------------------------
    // Own initiative
    // -------------------------------------------------------------------------

    /// Remember and roll the own initiative, e.g. `2d6+9`.
    #[instrument(skip(self))]
    pub async fn roll_own_initiative(&self, name: &str, expression: &str) -> Result<(), HelmError> {
        let name = name.trim();
        if name.is_empty() {
            let e = SchedulerError::EmptyName;
            self.notify(e.to_string());
            return Err(e.into());
        }
        let expression = match InitiativeExpression::parse_self_registration(expression.trim()) {
            Ok(expression) => expression,
            Err(e) => {
                self.notify(e.to_string());
                return Err(e.into());
            }
        };

        *self.personal.write().await = Some(PersonalInitiative(name.to_string(), expression));
        self.roll_personal(name, expression).await
    }

    /// Stored own initiative.
    pub async fn personal_initiative(&self) -> Option<PersonalInitiative> {
        self.personal.read().await.clone()
    }

    async fn roll_personal(&self, name: &str, expression: InitiativeExpression) -> Result<(), HelmError> {
        let label = format!("{} \"{}\"", INITIATIVE_LABEL_PREFIX, name);
        let roll_id = self.platform.submit_roll(&label, &expression.to_string()).await?;
        debug!(roll = %roll_id, %label, "initiative roll submitted");
        self.initiative_rolls.lock().await.insert(roll_id);
        Ok(())
    }

    async fn evaluate_initiative(&self, groups: &[ResultGroup]) {
        let Some(group) = groups.first() else {
            warn!("initiative result without dice");
            return;
        };

        let total = group.total();
        let message = format!(
            "{} Roll: {}D6+{} => Total: {}",
            group.name,
            group.results.len(),
            group.modifier,
            total
        );
        info!(label = %group.name, total, "initiative rolled");

        if let Err(e) = self.platform.show_result(groups).await {
            warn!(error = %e, "result display failed");
        }
        self.say(&message, &Recipients::Board).await;
        self.send_quietly(&Envelope::DiceLog(DiceLog::new(message.clone())), &Recipients::Board)
            .await;

        let report = InitiativeReport(group.name.clone(), total);
        let name = report.participant().unwrap_or(&group.name).to_string();
        self.send_quietly(&Envelope::SetInitiative(SetInitiative { message: report }), &Recipients::Gms)
            .await;

        self.notify(message);
        self.emit(HelmEvent::InitiativeRolled { name, total });
    }

    // -------------------------------------------------------------------------
    // Inbound chat and sync
    // -------------------------------------------------------------------------

    /// React to a chat line. Only the first word counts.
    #[instrument(skip(self))]
    pub async fn handle_chat(&self, sender: &Sender, text: &str) -> Result<(), HelmError> {
        match text.split_whitespace().next() {
            Some("ri!") => {
                let personal = self.personal.read().await.clone();
                match personal {
                    Some(p) => self.roll_personal(p.name(), p.expression()).await,
                    None => {
                        debug!("no own initiative to roll");
                        Ok(())
                    }
                }
            }
            Some("help!") => {
                self.say(HELP_TEXT, &Recipients::client(sender.player_id.clone())).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Apply one delivered sync payload. Never fails.
    #[instrument(skip(self, message), fields(from = %message.sender.player_name))]
    pub async fn handle_sync_message(&self, message: &SyncMessage) {
        let Some(dispatch) = self.router.route(message) else {
            return;
        };

        match dispatch {
            Dispatch::AssignThrow { role, set } => {
                self.notify(format!("The GM sent you a throw!: {}", set.name));
                let index = self.registry.write().await.add(role, set.clone());
                self.emit(HelmEvent::ThrowAssigned { role, index, set });
            }
            Dispatch::AppendLog(entry) => {
                if let Some(evicted) = self.log.write().await.append(entry.clone()) {
                    debug!(log = %evicted.log, "log entry evicted");
                }
                self.emit(HelmEvent::LogAppended(entry));
            }
            Dispatch::SetInitiative { name, total } => {
                let added = self
                    .scheduler
                    .lock()
                    .await
                    .add_or_update(&name, &total.to_string())
                    .map(|e| e.current_value);
                match added {
                    Ok(value) => {
                        info!(entry = %name, value, "initiative reported");
                        self.sync_table().await;
                    }
                    Err(e) => warn!(entry = %name, error = %e, "reported initiative rejected"),
                }
            }
            Dispatch::ReplaceTable(table) => {
                let hint = table.turn_hint(&self.own_name().await);
                *self.table.write().await = table.clone();
                self.emit(HelmEvent::InitiativeTableReplaced { table, hint });
            }
            Dispatch::Glitch { command } => self.emit(HelmEvent::Glitch { command }),
            Dispatch::HackStarted { difficulty, attempts } => {
                self.emit(HelmEvent::HackStarted { difficulty, attempts })
            }
            Dispatch::HackEnded { success } => self.emit(HelmEvent::HackEnded { success }),
        }
    }

    /// Handle everything currently waiting in an inbox; returns the count.
    pub async fn drain(&self, inbox: &mut mpsc::Receiver<SyncMessage>) -> usize {
        let mut handled = 0;
        while let Ok(message) = inbox.try_recv() {
            self.handle_sync_message(&message).await;
            handled += 1;
        }
        handled
    }

    async fn own_name(&self) -> String {
        match self.personal.read().await.as_ref() {
            Some(personal) => personal.name().to_string(),
            None => self.identity.player_name.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // GM outbound
    // -------------------------------------------------------------------------

    /// Hand a dice set to other clients.
    #[instrument(skip(self))]
    pub async fn send_throw(
        &self,
        kind: ThrowKind,
        set: &DiceSetConfig,
        recipients: &Recipients,
    ) -> Result<(), HelmError> {
        if set.name.trim().is_empty() {
            let e = HelmError::Validation("Please enter a name for the throw.".to_string());
            self.notify(e.to_string());
            return Err(e);
        }
        self.send(&kind.envelope(ThrowAssignment::from_set(set)), recipients).await
    }

    /// Publish the rendered initiative table.
    pub async fn send_initiative_table(&self, recipients: &Recipients) -> Result<(), HelmError> {
        let message = self.scheduler.lock().await.render().to_message();
        self.send(&Envelope::FetchInitiative(FetchInitiative { message }), recipients)
            .await
    }

    async fn sync_table(&self) {
        if let Err(e) = self.send_initiative_table(&Recipients::Board).await {
            warn!(error = %e, "initiative table not synced");
        }
    }

    /// Trigger a glitch effect.
    pub async fn send_glitch(&self, command: &str, recipients: &Recipients) -> Result<(), HelmError> {
        let envelope = Envelope::Glitch {
            command: command.to_string(),
        };
        self.send(&envelope, recipients).await
    }

    /// Start a hacking minigame.
    pub async fn send_hack(&self, difficulty: u32, attempts: u32, recipients: &Recipients) -> Result<(), HelmError> {
        self.send(&Envelope::Hack { difficulty, attempts }, recipients).await
    }

    /// End a hacking minigame.
    pub async fn send_end_hack(&self, success: bool, recipients: &Recipients) -> Result<(), HelmError> {
        self.send(&Envelope::EndHack { success }, recipients).await
    }

    // -------------------------------------------------------------------------
    // Initiative list
    // -------------------------------------------------------------------------

    /// Add or re-roll a participant. Syncs the table.
    #[instrument(skip(self))]
    pub async fn add_initiative(&self, name: &str, expression: &str) -> Result<InitiativeEntry, HelmError> {
        let added = self.scheduler.lock().await.add_or_update(name, expression).cloned();
        match added {
            Ok(entry) => {
                self.sync_table().await;
                Ok(entry)
            }
            Err(e) => {
                self.notify(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Remove a participant. Syncs the table.
    pub async fn remove_initiative(&self, name: &str) -> Option<InitiativeEntry> {
        let removed = self.scheduler.lock().await.remove(name);
        if removed.is_some() {
            self.sync_table().await;
        }
        removed
    }

    /// Roll everybody again and clear the strike marks. Syncs the table.
    pub async fn show_initiatives(&self) {
        self.scheduler.lock().await.reroll_all();
        self.sync_table().await;
    }

    /// Keep only the named participants. Syncs the table.
    pub async fn reset_initiative(&self, keep: &[&str]) {
        self.scheduler.lock().await.retain(keep);
        self.sync_table().await;
    }

    /// Set a condition box. Syncs the table.
    pub async fn set_condition(
        &self,
        name: &str,
        row: ConditionRow,
        level: Option<Severity>,
    ) -> Result<InitiativeEntry, HelmError> {
        let entry = self.scheduler.lock().await.set_condition(name, row, level).cloned()?;
        self.sync_table().await;
        Ok(entry)
    }

    /// Strike the next row. Returns false at the end of the table.
    pub async fn next_initiative(&self) -> bool {
        let advanced = self.scheduler.lock().await.advance();
        if advanced {
            self.sync_table().await;
        }
        advanced
    }

    /// Strike every row up to `index`. Syncs the table.
    pub async fn step_initiative(&self, index: usize) {
        self.scheduler.lock().await.step(index);
        self.sync_table().await;
    }

    /// Clear the strike marks. Syncs the table.
    pub async fn reset_strikes(&self) {
        self.scheduler.lock().await.reset();
        self.sync_table().await;
    }

    /// Current turn order.
    pub async fn initiative_order(&self) -> Vec<TurnSlot> {
        self.scheduler.lock().await.compute_order()
    }

    /// Participants in insertion order.
    pub async fn initiative_entries(&self) -> Vec<InitiativeEntry> {
        self.scheduler.lock().await.entries().to_vec()
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    /// Throw log, oldest first.
    pub async fn throw_log(&self) -> Vec<LogEntry> {
        self.log.read().await.to_vec()
    }

    /// Log entries whose player name starts with `prefix`.
    pub async fn filter_log(&self, prefix: &str) -> Vec<LogEntry> {
        self.log.read().await.filter(prefix).into_iter().cloned().collect()
    }

    /// Last received initiative table.
    pub async fn initiative_table(&self) -> InitiativeTable {
        self.table.read().await.clone()
    }

    /// Where the local participant stands in the last received table.
    pub async fn turn_hint(&self) -> TurnHint {
        let name = self.own_name().await;
        self.table.read().await.turn_hint(&name)
    }

    // -------------------------------------------------------------------------
    // Profile
    // -------------------------------------------------------------------------

    /// Current state as a profile document.
    pub async fn snapshot_profile(&self) -> Profile {
        let registry = self.registry.read().await.clone();
        Profile {
            dice_set_list: registry.list(Role::Offense).to_vec(),
            defence_dice_set_list: registry.list(Role::Defence).to_vec(),
            initiative_data: self.scheduler.lock().await.entries().to_vec(),
            personal_initiative_data: self.personal.read().await.clone(),
            throw_data: self.log.read().await.to_vec(),
        }
    }

    /// Replace the state with a profile. Stored initiatives are rolled again.
    pub async fn restore_profile(&self, profile: Profile) {
        *self.registry.write().await =
            DiceSetRegistry::from_lists(profile.dice_set_list, profile.defence_dice_set_list);
        {
            let mut scheduler = self.scheduler.lock().await;
            scheduler.restore(profile.initiative_data);
            scheduler.reroll_all();
        }
        *self.personal.write().await = profile.personal_initiative_data;
        *self.log.write().await = ThrowLog::with_entries(self.log_capacity, profile.throw_data);
        info!("profile restored");
    }

    /// Save the current state.
    #[instrument(skip(self, store))]
    pub async fn save_profile<S: ProfileStore>(&self, store: &S) -> Result<(), HelmError> {
        let profile = self.snapshot_profile().await;
        store.save(&profile).await?;
        Ok(())
    }

    /// Load a stored state. Returns false if nothing was stored.
    #[instrument(skip(self, store))]
    pub async fn load_profile<S: ProfileStore>(&self, store: &S) -> Result<bool, HelmError> {
        match store.load().await? {
            Some(profile) => {
                self.restore_profile(profile).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::dice::outcome::DamageOutcome;
    use crate::network::loopback::{
        BoardConnection, LocalBoard, RecordingChat, ScriptedDicePlatform, StaticDirectory,
    };
    use crate::storage::MemoryProfileStore;

    type Helm = CombatHelm<ScriptedDicePlatform, BoardConnection, RecordingChat>;

    struct Client {
        helm: Helm,
        platform: Arc<ScriptedDicePlatform>,
        chat: Arc<RecordingChat>,
        inbox: mpsc::Receiver<SyncMessage>,
        events: mpsc::Receiver<HelmEvent>,
    }

    impl Client {
        async fn join(board: &Arc<LocalBoard>, name: &str, can_gm: bool) -> Self {
            let directory = StaticDirectory::new(name, can_gm);
            let (connection, inbox) = board.join(directory.0.clone()).await;
            let platform = Arc::new(ScriptedDicePlatform::new(DeterministicRng::from_label(name)));
            let chat = Arc::new(RecordingChat::new());
            let config = HelmConfig {
                rng_seed: Some(7),
                ..HelmConfig::default()
            };
            let (helm, events) = CombatHelm::connect(
                &config,
                &directory,
                Arc::clone(&platform),
                Arc::new(connection),
                Arc::clone(&chat),
            )
            .await
            .unwrap();
            Self { helm, platform, chat, inbox, events }
        }

        /// Roll the oldest submission and feed it back.
        async fn resolve_next(&self) -> Result<(), HelmError> {
            let submission = self.platform.next_submission().await.expect("nothing submitted");
            let event = self.platform.roll(&submission).await;
            self.helm.handle_platform_event(event).await
        }

        async fn drain(&mut self) -> usize {
            self.helm.drain(&mut self.inbox).await
        }

        fn take_events(&mut self) -> Vec<HelmEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }

        async fn chat_texts(&self) -> Vec<String> {
            self.chat.lines().await.into_iter().map(|(text, _)| text).collect()
        }
    }

    fn resolved(events: &[HelmEvent]) -> Vec<&RollOutcome> {
        events
            .iter()
            .filter_map(|e| match e {
                HelmEvent::RollResolved(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_offense_throw_with_reroll() {
        let board = LocalBoard::new();
        let mut gm = Client::join(&board, "Grey", true).await;
        let mut kira = Client::join(&board, "Kira", false).await;

        let index = kira.helm.add_dice_set(Role::Offense, DiceSetConfig::new("Pistol", 4, 3, "8M", 1)).await;
        kira.platform.script(vec![6, 3, 5]).await;
        kira.platform.script(vec![2]).await;

        kira.helm.submit_throw(Role::Offense, index).await.unwrap();
        kira.resolve_next().await.unwrap();
        assert_eq!(kira.platform.pending().await, 1);
        assert_eq!(kira.helm.chains_in_flight().await, 1);

        kira.resolve_next().await.unwrap();
        assert_eq!(kira.helm.chains_in_flight().await, 0);

        let chat = kira.chat_texts().await;
        assert_eq!(chat[0], "1 dice of the \"Pistol\" throw can be rerolled.");
        assert_eq!(chat[1], "2 of 3 dice of the \"Pistol\" throw were successful. Effective damage: 8S");

        let events = kira.take_events();
        let outcomes = resolved(&events);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].successes, 2);
        assert!(events.iter().any(|e| matches!(e, HelmEvent::RerollRequested { count: 1, .. })));

        let shown = kira.platform.shown().await;
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0][0].name, "\"Pistol\"");

        // the log line reaches everybody, the thrower included
        assert_eq!(gm.drain().await, 1);
        assert_eq!(kira.drain().await, 1);
        let log = gm.helm.throw_log().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].player_name, "Kira");
        assert_eq!(log[0].log, "Pistol => 3 D6 vs MW 4 : 2 success(es). DMG 8S");
        assert_eq!(kira.helm.throw_log().await, kira.helm.filter_log("ki").await);
    }

    #[tokio::test]
    async fn test_gm_mode_keeps_results_private() {
        let board = LocalBoard::new();
        let mut gm = Client::join(&board, "Grey", true).await;
        let kira = Client::join(&board, "Kira", false).await;
        kira.helm.set_gm_mode(true);

        kira.helm.add_dice_set(Role::Defence, DiceSetConfig::new("Armor", 4, 4, "8S", 1)).await;
        kira.platform.script(vec![4, 5, 2, 1]).await;
        kira.helm.submit_throw(Role::Defence, 0).await.unwrap();
        kira.resolve_next().await.unwrap();

        let lines = kira.chat.lines().await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].1, Recipients::Gms);
        assert!(lines[0].0.ends_with("Effective damage: M"));
        assert!(kira.platform.shown().await.is_empty());
        assert_eq!(gm.drain().await, 0);
    }

    #[tokio::test]
    async fn test_gm_mode_reroll_note_goes_to_gms() {
        let board = LocalBoard::new();
        let mut gm = Client::join(&board, "Grey", true).await;
        let kira = Client::join(&board, "Kira", false).await;
        kira.helm.set_gm_mode(true);

        let index = kira.helm.add_dice_set(Role::Offense, DiceSetConfig::new("Pistol", 4, 3, "8M", 1)).await;
        kira.platform.script(vec![6, 3, 5]).await;
        kira.platform.script(vec![2]).await;
        kira.helm.submit_throw(Role::Offense, index).await.unwrap();
        kira.resolve_next().await.unwrap();

        let lines = kira.chat.lines().await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, "1 dice of the \"Pistol\" throw can be rerolled.");
        assert_eq!(lines[0].1, Recipients::Gms);

        kira.resolve_next().await.unwrap();
        let lines = kira.chat.lines().await;
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|(_, to)| *to == Recipients::Gms));
        assert_eq!(gm.drain().await, 0);
    }

    #[tokio::test]
    async fn test_undrained_gm_keeps_editing_initiative() {
        let board = LocalBoard::new();
        let mut gm = Client::join(&board, "Grey", true).await;
        let mut kira = Client::join(&board, "Kira", false).await;

        // Every change echoes a fetchini into both inboxes
        for i in 0..70 {
            let added = tokio::time::timeout(
                std::time::Duration::from_millis(500),
                gm.helm.add_initiative(&format!("Ganger {}", i), "5"),
            )
            .await;
            assert!(matches!(added, Ok(Ok(_))), "change {} blocked", i);
        }
        assert_eq!(gm.helm.initiative_entries().await.len(), 70);

        assert_eq!(gm.drain().await, 64);
        assert_eq!(kira.drain().await, 64);

        // Drained inboxes take the next sync
        gm.helm.add_initiative("Drone", "14").await.unwrap();
        assert_eq!(kira.drain().await, 1);
        assert!(kira.helm.initiative_table().await.to_message().contains("Drone"));
    }

    #[tokio::test]
    async fn test_duplicate_results_are_ignored() {
        let board = LocalBoard::new();
        let mut kira = Client::join(&board, "Kira", false).await;
        kira.helm.add_dice_set(Role::Offense, DiceSetConfig::open_throw("Search", 2)).await;
        kira.platform.script(vec![3, 2]).await;

        kira.helm.submit_throw(Role::Offense, 0).await.unwrap();
        let submission = kira.platform.next_submission().await.unwrap();
        let event = kira.platform.roll(&submission).await;
        kira.helm.handle_platform_event(event.clone()).await.unwrap();
        kira.helm.handle_platform_event(event).await.unwrap();

        let events = kira.take_events();
        let outcomes = resolved(&events);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].open_total, Some(5));
        assert_eq!(kira.drain().await, 1);
    }

    #[tokio::test]
    async fn test_validation_failures_notify() {
        let board = LocalBoard::new();
        let mut kira = Client::join(&board, "Kira", false).await;
        kira.helm.add_dice_set(Role::Offense, DiceSetConfig::new("Empty", 4, 0, "8M", 1)).await;

        assert!(matches!(
            kira.helm.submit_throw(Role::Offense, 0).await,
            Err(HelmError::Throw(ThrowError::NoDice))
        ));
        assert!(matches!(
            kira.helm.submit_throw(Role::Defence, 3).await,
            Err(HelmError::Registry(_))
        ));
        assert!(matches!(
            kira.helm.repeat_last_roll(None).await,
            Err(HelmError::Throw(ThrowError::NoPreviousRoll))
        ));
        assert_eq!(kira.platform.pending().await, 0);

        let events = kira.take_events();
        assert_eq!(events[0], HelmEvent::Notice("Can't roll 0 dice!".to_string()));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_reroll_abandons_chain() {
        let board = LocalBoard::new();
        let kira = Client::join(&board, "Kira", false).await;
        kira.helm.add_dice_set(Role::Offense, DiceSetConfig::new("Pistol", 4, 3, "8M", 1)).await;
        kira.platform.script(vec![6, 1, 1]).await;

        kira.helm.submit_throw(Role::Offense, 0).await.unwrap();
        kira.platform.refuse_submissions(true);
        assert!(matches!(kira.resolve_next().await, Err(HelmError::Platform(_))));
        assert_eq!(kira.helm.chains_in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_removed_roll_is_dropped() {
        let board = LocalBoard::new();
        let kira = Client::join(&board, "Kira", false).await;
        kira.helm.add_dice_set(Role::Offense, DiceSetConfig::new("Pistol", 4, 3, "8M", 1)).await;
        kira.helm.submit_throw(Role::Offense, 0).await.unwrap();

        let submission = kira.platform.next_submission().await.unwrap();
        kira.helm
            .handle_platform_event(PlatformEvent::RollRemoved { roll_id: submission.roll_id.clone() })
            .await
            .unwrap();
        assert_eq!(kira.helm.chains_in_flight().await, 0);

        let late = kira.platform.roll(&submission).await;
        kira.helm.handle_platform_event(late).await.unwrap();
        assert!(kira.chat.lines().await.is_empty());
    }

    #[tokio::test]
    async fn test_karma_reroll_adds_successes() {
        let board = LocalBoard::new();
        let mut kira = Client::join(&board, "Kira", false).await;
        kira.helm.add_dice_set(Role::Offense, DiceSetConfig::new("Rifle", 4, 4, "8M", 1)).await;

        kira.platform.script(vec![5, 1, 2, 3]).await;
        kira.helm.submit_throw(Role::Offense, 0).await.unwrap();
        kira.resolve_next().await.unwrap();

        kira.platform.script(vec![4, 5, 1]).await;
        kira.helm.repeat_last_roll(None).await.unwrap();
        let submission = kira.platform.next_submission().await.unwrap();
        assert_eq!(submission.expression, "3d6");
        let event = kira.platform.roll(&submission).await;
        kira.helm.handle_platform_event(event).await.unwrap();

        let events = kira.take_events();
        let outcomes = resolved(&events);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[1].karma_used);
        assert_eq!(outcomes[1].successes, 3);
        assert_eq!(outcomes[1].damage, Some(DamageOutcome::Dealt { code: "8S".parse().unwrap() }));

        kira.drain().await;
        let log = kira.helm.throw_log().await;
        assert!(log[1].log.ends_with("Karma used!"));
    }

    #[tokio::test]
    async fn test_own_initiative_reaches_gm_table() {
        let board = LocalBoard::new();
        let mut gm = Client::join(&board, "Grey", true).await;
        let mut kira = Client::join(&board, "Kira", false).await;

        assert!(matches!(
            kira.helm.roll_own_initiative("Kira", "14").await,
            Err(HelmError::Expression(_))
        ));
        assert_eq!(kira.platform.pending().await, 0);

        kira.platform.script(vec![4]).await;
        kira.helm.roll_own_initiative("Kira", "1d6+10").await.unwrap();
        kira.resolve_next().await.unwrap();

        let chat = kira.chat_texts().await;
        assert_eq!(chat[0], "Initiative: \"Kira\" Roll: 1D6+10 => Total: 14");
        assert!(kira
            .take_events()
            .contains(&HelmEvent::InitiativeRolled { name: "Kira".to_string(), total: 14 }));

        // dicelog, setini, then the table the setini triggered
        assert_eq!(gm.drain().await, 3);
        let entries = gm.helm.initiative_entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Kira");
        assert_eq!(entries[0].current_value, 14);

        // own dicelog, then the table the GM synced
        assert_eq!(kira.drain().await, 2);
        assert_eq!(kira.helm.turn_hint().await, TurnHint::Now);
        assert!(kira.take_events().iter().any(|e| matches!(
            e,
            HelmEvent::InitiativeTableReplaced { hint: TurnHint::Now, .. }
        )));
    }

    #[tokio::test]
    async fn test_setini_ignored_without_gm_rights() {
        let board = LocalBoard::new();
        let kira = Client::join(&board, "Kira", false).await;
        let message = SyncMessage {
            sender: Sender {
                client_id: "c-9".to_string(),
                player_id: "p-9".to_string(),
                player_name: "Ash".to_string(),
            },
            payload: r#"{"type":"setini","message":["Initiative: \"Ash\"",12]}"#.to_string(),
        };

        kira.helm.handle_sync_message(&message).await;
        assert!(kira.helm.initiative_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_chat_commands() {
        let board = LocalBoard::new();
        let kira = Client::join(&board, "Kira", false).await;
        let gm = Client::join(&board, "Grey", true).await;
        let sender = Sender {
            client_id: "c-1".to_string(),
            player_id: "p-1".to_string(),
            player_name: "Grey".to_string(),
        };

        gm.helm.handle_chat(&sender, "ri!").await.unwrap();
        assert_eq!(gm.platform.pending().await, 0);

        kira.helm.roll_own_initiative("Kira", "2d6+9").await.unwrap();
        kira.helm.handle_chat(&sender, "ri! everyone").await.unwrap();
        assert_eq!(kira.platform.pending().await, 2);

        kira.helm.handle_chat(&sender, "help!").await.unwrap();
        let lines = kira.chat.lines().await;
        assert_eq!(lines, vec![(HELP_TEXT.to_string(), Recipients::client("p-1"))]);

        kira.helm.handle_chat(&sender, "hello there").await.unwrap();
        assert_eq!(kira.chat.lines().await.len(), 1);
    }

    #[tokio::test]
    async fn test_gm_assigns_throw() {
        let board = LocalBoard::new();
        let gm = Client::join(&board, "Grey", true).await;
        let mut kira = Client::join(&board, "Kira", false).await;

        let nameless = DiceSetConfig::new("  ", 4, 3, "8M", 1);
        assert!(matches!(
            gm.helm.send_throw(ThrowKind::Offense, &nameless, &Recipients::Board).await,
            Err(HelmError::Validation(_))
        ));

        let ambush = DiceSetConfig::new("Ambush", 4, 6, "9M", 2);
        let kira_client = kira.helm.identity().client_id.clone();
        gm.helm
            .send_throw(ThrowKind::Offense, &ambush, &Recipients::client(kira_client))
            .await
            .unwrap();
        gm.helm
            .send_throw(ThrowKind::Open, &ambush, &Recipients::Board)
            .await
            .unwrap();

        assert_eq!(kira.drain().await, 2);
        assert_eq!(kira.helm.dice_sets(Role::Offense).await[0], ambush);
        assert!(kira.helm.dice_sets(Role::Offense).await[1].is_open_throw());
        assert!(kira
            .take_events()
            .contains(&HelmEvent::Notice("The GM sent you a throw!: Ambush".to_string())));
    }

    #[tokio::test]
    async fn test_minigame_signals_become_events() {
        let board = LocalBoard::new();
        let gm = Client::join(&board, "Grey", true).await;
        let mut kira = Client::join(&board, "Kira", false).await;

        gm.helm.send_glitch("static", &Recipients::Board).await.unwrap();
        gm.helm.send_hack(3, 4, &Recipients::Board).await.unwrap();
        gm.helm.send_end_hack(true, &Recipients::Board).await.unwrap();

        assert_eq!(kira.drain().await, 3);
        assert_eq!(
            kira.take_events(),
            vec![
                HelmEvent::Glitch { command: "static".to_string() },
                HelmEvent::HackStarted { difficulty: 3, attempts: 4 },
                HelmEvent::HackEnded { success: true },
            ]
        );
    }

    #[tokio::test]
    async fn test_initiative_table_sync() {
        let board = LocalBoard::new();
        let gm = Client::join(&board, "Grey", true).await;
        let mut kira = Client::join(&board, "Kira", false).await;

        gm.helm.add_initiative("Ash", "23").await.unwrap();
        gm.helm.add_initiative("Kira", "17").await.unwrap();
        assert!(gm.helm.add_initiative("Bad", "d6").await.is_err());

        assert_eq!(kira.drain().await, 2);
        assert_eq!(kira.helm.turn_hint().await, TurnHint::InTurns(1));

        assert!(gm.helm.next_initiative().await);
        kira.drain().await;
        assert_eq!(kira.helm.turn_hint().await, TurnHint::Now);

        gm.helm
            .set_condition("Kira", ConditionRow::Row1, Some(Severity::Serious))
            .await
            .unwrap();
        gm.helm.reset_strikes().await;
        kira.drain().await;
        let table = kira.helm.initiative_table().await;
        assert!(table.rows().iter().any(|r| r.text == "[14] :: [-3] Kira (17)"));

        gm.helm.reset_initiative(&["Ash"]).await;
        kira.drain().await;
        assert_eq!(kira.helm.turn_hint().await, TurnHint::NotListed);
        assert!(gm.helm.remove_initiative("Ash").await.is_some());
        assert!(gm.helm.initiative_order().await.is_empty());
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let board = LocalBoard::new();
        let gm = Client::join(&board, "Grey", true).await;
        gm.helm.add_dice_set(Role::Offense, DiceSetConfig::new("Pistol", 4, 3, "8M", 1)).await;
        gm.helm.add_dice_set(Role::Defence, DiceSetConfig::new("Armor", 4, 4, "8S", 1)).await;
        gm.helm.add_initiative("Ash", "2d6+3").await.unwrap();

        let store = MemoryProfileStore::new();
        gm.helm.save_profile(&store).await.unwrap();

        let other = Client::join(&board, "Grey", true).await;
        assert!(other.helm.load_profile(&store).await.unwrap());
        assert_eq!(other.helm.dice_sets(Role::Defence).await[0].name, "Armor");
        let entries = other.helm.initiative_entries().await;
        assert_eq!(entries[0].name, "Ash");
        assert!((5..=15).contains(&entries[0].current_value));

        let empty = MemoryProfileStore::new();
        assert!(!other.helm.load_profile(&empty).await.unwrap());
    }
}
