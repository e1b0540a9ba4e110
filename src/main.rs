//! Combat Helm Demo
//!
//! Runs a GM and a player on an in-process board: the GM hands out a throw,
//! the player throws it, both sides see the log, then a round of initiative
//! is rolled and stepped through.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use combat_helm::{
    network::{
        BoardConnection, ChatChannel, HelmEvent, LocalBoard, Recipients, RecordingChat,
        ScriptedDicePlatform, StaticDirectory, SyncBus, SyncMessage, ThrowKind,
    },
    CombatHelm, DiceSetConfig, FileProfileStore, HelmConfig, Role, VERSION,
};

type DemoHelm = CombatHelm<ScriptedDicePlatform, BoardConnection, RecordingChat>;

struct Seat {
    helm: DemoHelm,
    platform: Arc<ScriptedDicePlatform>,
    inbox: mpsc::Receiver<SyncMessage>,
    events: mpsc::Receiver<HelmEvent>,
}

async fn take_seat(board: &Arc<LocalBoard>, config: &HelmConfig, name: &str, can_gm: bool) -> anyhow::Result<Seat> {
    let directory = StaticDirectory::new(name, can_gm);
    let (connection, inbox) = board.join(directory.0.clone()).await;
    let platform = Arc::new(ScriptedDicePlatform::new(config.rng(name)));
    let (helm, events) = CombatHelm::connect(
        config,
        &directory,
        Arc::clone(&platform),
        Arc::new(connection),
        Arc::new(RecordingChat::new()),
    )
    .await?;
    Ok(Seat { helm, platform, inbox, events })
}

/// Roll everything the seat has put in the tray, rerolls included.
async fn settle<B: SyncBus, C: ChatChannel>(
    helm: &CombatHelm<ScriptedDicePlatform, B, C>,
    platform: &ScriptedDicePlatform,
) -> anyhow::Result<()> {
    while let Some(submission) = platform.next_submission().await {
        let event = platform.roll(&submission).await;
        helm.handle_platform_event(event).await?;
    }
    Ok(())
}

fn print_notices(name: &str, events: &mut mpsc::Receiver<HelmEvent>) {
    while let Ok(event) = events.try_recv() {
        if let HelmEvent::Notice(text) = event {
            info!("[{}] {}", name, text);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Combat Helm v{}", VERSION);

    let config = HelmConfig::from_env();
    info!("GM mode: {}, avoid unneeded explosion: {}", config.gm_mode, config.avoid_unneeded_explosion);

    demo_session(&config).await
}

/// Demo function to exercise a full session.
async fn demo_session(config: &HelmConfig) -> anyhow::Result<()> {
    info!("=== Opening the table ===");

    let board = LocalBoard::new();
    let mut gm = take_seat(&board, config, "Grey", true).await?;
    let mut kira = take_seat(&board, config, "Kira", false).await?;

    let store = FileProfileStore::new(&config.profile_path);
    if kira.helm.load_profile(&store).await? {
        info!("Profile loaded from {}", store.path().display());
    }

    // GM hands out a throw
    let ambush = DiceSetConfig::new("Ambush", 4, 6, "9M", 2);
    let kira_client = kira.helm.identity().client_id.clone();
    gm.helm
        .send_throw(ThrowKind::Offense, &ambush, &Recipients::client(kira_client))
        .await?;
    kira.helm.drain(&mut kira.inbox).await;

    let index = kira
        .helm
        .dice_sets(Role::Offense)
        .await
        .len()
        .checked_sub(1)
        .ok_or_else(|| anyhow::anyhow!("no throw arrived"))?;
    kira.helm.submit_throw(Role::Offense, index).await?;
    settle(&kira.helm, &kira.platform).await?;

    gm.helm.drain(&mut gm.inbox).await;
    kira.helm.drain(&mut kira.inbox).await;

    info!("=== Throw log ===");
    for entry in gm.helm.throw_log().await {
        info!("{}", entry.render());
    }

    // Initiative round
    info!("=== Initiative ===");
    kira.helm.roll_own_initiative("Kira", "2d6+9").await?;
    settle(&kira.helm, &kira.platform).await?;
    gm.helm.drain(&mut gm.inbox).await;
    gm.helm.add_initiative("Ganger", "1d6+8").await?;
    gm.helm.add_initiative("Drone", "14").await?;

    for slot in gm.helm.initiative_order().await {
        info!("{}", slot.render());
    }

    kira.helm.drain(&mut kira.inbox).await;
    info!("Kira's turn: {}", kira.helm.turn_hint().await);

    while gm.helm.next_initiative().await {
        kira.helm.drain(&mut kira.inbox).await;
        info!("Kira's turn: {}", kira.helm.turn_hint().await);
    }

    print_notices("Grey", &mut gm.events);
    print_notices("Kira", &mut kira.events);

    kira.helm.save_profile(&store).await?;
    info!("Profile saved to {}", store.path().display());

    Ok(())
}
