//! Command dispatch
//!
//! A single coordinator task pulls submitted commands and hands each one
//! to its own worker, so a slow engine only delays commands for its own
//! game. Commands for the same game serialize on that game's engine lock.

use crate::command::{Action, Command, Response};
use crate::registry::{EngineHandle, GameRegistry};
use engine_bridge::open_engine;
use relay_core::{EngineKind, GameSession, RelayConfig, RelayError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Parameters of a new game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub white: String,
    /// Second human player, the engine only referees when set
    pub black: Option<String>,
    /// Engine to use, the configured default when unset
    pub engine: Option<EngineKind>,
}

impl NewGame {
    /// Game against the engine
    pub fn single(white: impl Into<String>) -> Self {
        Self {
            white: white.into(),
            black: None,
            engine: None,
        }
    }

    /// Two humans
    pub fn multiplayer(white: impl Into<String>, black: impl Into<String>) -> Self {
        Self {
            white: white.into(),
            black: Some(black.into()),
            engine: None,
        }
    }

    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = Some(engine);
        self
    }

    fn players(&self) -> Vec<&str> {
        std::iter::once(self.white.as_str())
            .chain(self.black.as_deref())
            .collect()
    }
}

struct Job {
    command: Command,
    engine: EngineHandle,
}

/// Games and the queue feeding them
pub struct PlayQueue {
    config: RelayConfig,
    games: Mutex<GameRegistry>,
    jobs: mpsc::UnboundedSender<Job>,
    running: Arc<AtomicBool>,
    coordinator: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PlayQueue {
    /// Start the dispatch coordinator. Must be called inside a tokio runtime.
    pub fn start(config: RelayConfig) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let coordinator = tokio::spawn(dispatch(
            rx,
            running.clone(),
            config.queue.poll_interval(),
        ));
        info!(
            "Play queue started (poll interval {:?})",
            config.queue.poll_interval()
        );

        Self {
            config,
            games: Mutex::new(GameRegistry::new()),
            jobs,
            running,
            coordinator: tokio::sync::Mutex::new(Some(coordinator)),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn games(&self) -> MutexGuard<'_, GameRegistry> {
        self.games.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Players currently in a game
    pub fn players(&self) -> Vec<String> {
        self.games()
            .players()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Number of running games
    pub fn game_count(&self) -> usize {
        self.games().count()
    }

    /// Start a game and its engine
    pub async fn new_game(&self, game: NewGame) -> Result<()> {
        if !self.is_running() {
            return Err(RelayError::QueueStopped);
        }
        self.games().ensure_free(&game.players())?;

        let kind = game.engine.unwrap_or(self.config.default_engine);
        let session = GameSession::new(game.white.clone(), game.black.clone());
        let mut engine = open_engine(kind, self.config.engine(kind).clone(), session);
        if let Err(e) = engine.new_game().await {
            // Reap whatever did start
            if let Err(end) = engine.end_game().await {
                warn!("Failed to end {} after a failed start: {}", kind, end);
            }
            return Err(e);
        }

        let handle: EngineHandle = Arc::new(tokio::sync::Mutex::new(engine));
        let inserted = self.games().insert(&game.players(), handle.clone());
        if let Err(e) = inserted {
            // Lost a race against another `new` for the same player
            if let Err(end) = handle.lock().await.end_game().await {
                warn!("Failed to end duplicate {} game of {}: {}", kind, game.white, end);
            }
            return Err(e);
        }

        match &game.black {
            Some(black) => info!("New {} game: {} vs {}", kind, game.white, black),
            None => info!("New {} game for {}", kind, game.white),
        }
        Ok(())
    }

    /// Queue a command. Fails without invoking the sink when the target
    /// has no game or the queue has stopped.
    pub fn submit(&self, command: Command) -> Result<()> {
        if !self.is_running() {
            return Err(RelayError::QueueStopped);
        }
        let engine = self.games().get(&command.target)?;
        debug!("Queued {} for {}", command.action, command.target);
        self.jobs
            .send(Job { command, engine })
            .map_err(|_| RelayError::QueueStopped)
    }

    /// Submit and wait for the outcome
    pub async fn call(&self, target: &str, action: Action) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let command = Command::new(target, action, move |done: Command| {
            let sender = tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(sender) = sender {
                let _ = sender.send(done);
            }
        });

        self.submit(command)?;
        let done = rx.await.map_err(|_| RelayError::QueueStopped)?;
        done.result.unwrap_or(Err(RelayError::QueueStopped))
    }

    /// End the game `player` takes part in
    pub async fn end_game(&self, player: &str) -> Result<()> {
        let engine = self.games().remove(player)?;
        let mut engine = engine.lock().await;
        info!("Ending {} game of {}", engine.kind(), player);
        engine.end_game().await
    }

    /// Stop dispatching, wait for in-flight commands, then end every game.
    /// Commands still queued reach their sinks with `QueueStopped`.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping play queue");

        if let Some(coordinator) = self.coordinator.lock().await.take() {
            if let Err(e) = coordinator.await {
                error!("Play queue coordinator panicked: {}", e);
            }
        }

        let engines = self.games().drain();
        for engine in engines {
            let mut engine = engine.lock().await;
            if let Err(e) = engine.end_game().await {
                warn!(
                    "Failed to end {} game of {}: {}",
                    engine.kind(),
                    engine.session().white(),
                    e
                );
            }
        }
        info!("Play queue stopped");
    }
}

async fn dispatch(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut workers = JoinSet::new();

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            job = jobs.recv() => match job {
                Some(job) => {
                    workers.spawn(perform(job));
                }
                // Every sender is gone
                None => break,
            },

            Some(done) = workers.join_next(), if !workers.is_empty() => {
                report(done);
            }

            // Bounded wait so a stop request is observed
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    jobs.close();
    while let Some(done) = workers.join_next().await {
        report(done);
    }

    let mut abandoned = 0;
    while let Ok(job) = jobs.try_recv() {
        job.command.abandon();
        abandoned += 1;
    }
    if abandoned > 0 {
        warn!("Discarded {} queued commands on stop", abandoned);
    }
    debug!("Dispatch coordinator exiting");
}

fn report(done: std::result::Result<(), JoinError>) {
    if let Err(e) = done {
        error!("Command worker failed: {}", e);
    }
}

async fn perform(job: Job) {
    let Job { command, engine } = job;
    let result = {
        let mut engine = engine.lock().await;
        match &command.action {
            Action::Move(position) => engine
                .make_move(position)
                .await
                .map(|reply| Response::Move {
                    played: position.clone(),
                    reply,
                }),
            Action::Board => engine.render_board().await.map(|board| Response::Board {
                board: board.render(),
            }),
            Action::Fen => engine
                .position_notation()
                .await
                .map(|fen| Response::Position { fen }),
        }
    };

    match &result {
        Ok(_) => debug!("{} for {} done", command.action, command.target),
        Err(e) => debug!("{} for {} failed: {}", command.action, command.target, e),
    }
    command.complete(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Board, EngineConfig};
    use std::time::Instant;

    const FAKE_GNUCHESS: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../engine-bridge/tests/fixtures/fake_gnuchess.sh"
    );
    const FAKE_CRAFTY: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../engine-bridge/tests/fixtures/fake_crafty.sh"
    );

    fn fake(script: &str, delay: &str) -> EngineConfig {
        EngineConfig::with_program("/bin/sh", vec![script.to_string(), delay.to_string()])
    }

    fn config(delay: &str) -> RelayConfig {
        let mut config = RelayConfig::default();
        config.gnuchess = fake(FAKE_GNUCHESS, delay);
        config.crafty = fake(FAKE_CRAFTY, delay);
        config.queue.poll_interval_ms = 50;
        config
    }

    fn played(response: Result<Response>) -> (String, Option<String>) {
        match response {
            Ok(Response::Move { played, reply }) => (played, reply),
            other => panic!("expected a move, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_player_game() {
        let queue = PlayQueue::start(config("0"));
        queue.new_game(NewGame::single("alice")).await.unwrap();

        assert_eq!(
            played(queue.call("alice", Action::Move("e4".into())).await),
            ("e4".to_string(), Some("e5".to_string()))
        );
        assert_eq!(
            queue.call("alice", Action::Move("e4".into())).await,
            Err(RelayError::InvalidMove("e4".into()))
        );
        assert_eq!(
            queue.call("alice", Action::Move("e9".into())).await,
            Err(RelayError::InvalidMove("e9".into()))
        );
        assert_eq!(
            queue.call("alice", Action::Fen).await,
            Ok(Response::Position {
                fen: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2".into()
            })
        );
        assert_eq!(
            queue.call("alice", Action::Board).await,
            Ok(Response::Board {
                board: Board::starting().render()
            })
        );

        queue.stop().await;
        assert!(queue.players().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_game() {
        let queue = PlayQueue::start(config("0"));
        queue.new_game(NewGame::single("alice")).await.unwrap();
        assert_eq!(
            queue.new_game(NewGame::single("alice")).await,
            Err(RelayError::GameAlreadyExists("alice".into()))
        );
        assert_eq!(
            queue.new_game(NewGame::multiplayer("bob", "alice")).await,
            Err(RelayError::GameAlreadyExists("alice".into()))
        );
        assert_eq!(queue.players(), vec!["alice".to_string()]);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_game_rejected_at_submit() {
        let queue = PlayQueue::start(config("0"));
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let command = Command::new("nobody", Action::Move("e4".into()), move |_| {
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(
            queue.submit(command),
            Err(RelayError::NoSuchGame("nobody".into()))
        );
        queue.stop().await;
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_games_progress_concurrently() {
        let queue = PlayQueue::start(config("0.5"));
        queue.new_game(NewGame::single("alice")).await.unwrap();
        queue.new_game(NewGame::single("bob")).await.unwrap();

        let started = Instant::now();
        let (alice, bob) = tokio::join!(
            queue.call("alice", Action::Move("e4".into())),
            queue.call("bob", Action::Move("d4".into())),
        );
        let elapsed = started.elapsed();

        assert_eq!(played(alice).1.as_deref(), Some("e5"));
        assert_eq!(played(bob).1.as_deref(), Some("e5"));
        assert!(
            elapsed < Duration::from_millis(950),
            "two half second replies took {:?}",
            elapsed
        );
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_every_command_reaches_sink_once() {
        let queue = PlayQueue::start(config("0"));
        queue.new_game(NewGame::single("alice")).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: crate::ResultSink = Arc::new(move |done: Command| {
            let _ = tx.send(done);
        });
        for position in ["e4", "d4", "e4"] {
            let command = Command::with_sink("alice", Action::Move(position.into()), sink.clone());
            queue.submit(command).unwrap();
        }

        let mut finished = Vec::new();
        for _ in 0..3 {
            finished.push(rx.recv().await.unwrap());
        }
        assert!(finished.iter().all(Command::is_done));
        assert_eq!(finished.iter().filter(|c| c.is_invalid_move()).count(), 1);

        queue.stop().await;
        // Finished commands hold the last sink clones
        drop(finished);
        drop(sink);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_multiplayer_game() {
        let queue = PlayQueue::start(config("0"));
        queue
            .new_game(NewGame::multiplayer("alice", "bob").with_engine(EngineKind::Crafty))
            .await
            .unwrap();
        assert_eq!(queue.game_count(), 1);
        assert_eq!(queue.players(), vec!["alice".to_string(), "bob".to_string()]);

        assert_eq!(
            played(queue.call("alice", Action::Move("e4".into())).await),
            ("e4".to_string(), None)
        );
        assert_eq!(
            played(queue.call("bob", Action::Move("e5".into())).await),
            ("e5".to_string(), None)
        );
        assert_eq!(
            queue.call("bob", Action::Move("e4".into())).await,
            Err(RelayError::InvalidMove("e4".into()))
        );
        assert_eq!(
            queue.call("bob", Action::Fen).await,
            Ok(Response::Position {
                fen: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2".into()
            })
        );

        queue.end_game("bob").await.unwrap();
        assert!(queue.players().is_empty());
        assert_eq!(
            queue.call("alice", Action::Board).await,
            Err(RelayError::NoSuchGame("alice".into()))
        );
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_game_survives_unknown_engine_state() {
        let queue = PlayQueue::start(config("0"));
        queue
            .new_game(NewGame::single("alice").with_engine(EngineKind::Crafty))
            .await
            .unwrap();

        assert!(matches!(
            queue.call("alice", Action::Move("stall".into())).await,
            Err(RelayError::UnknownEngineState(_))
        ));
        let retry = tokio::time::timeout(
            Duration::from_secs(5),
            queue.call("alice", Action::Move("e4".into())),
        )
        .await
        .expect("game should not hang after an unknown state");
        assert_eq!(played(retry).1.as_deref(), Some("Nc6"));

        tokio::time::timeout(Duration::from_secs(5), queue.end_game("alice"))
            .await
            .expect("end should not wait on a stuck worker")
            .unwrap();
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_failed_start_is_cleaned_up() {
        let mut config = config("0");
        config.crafty = EngineConfig::with_program("/nonexistent/crafty", vec![]);
        let queue = PlayQueue::start(config);

        let started = queue
            .new_game(NewGame::single("alice").with_engine(EngineKind::Crafty))
            .await;
        assert!(matches!(started, Err(RelayError::Spawn(_))));
        assert_eq!(queue.game_count(), 0);

        queue.new_game(NewGame::single("alice")).await.unwrap();
        assert_eq!(queue.game_count(), 1);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_game_can_restart_after_end() {
        let queue = PlayQueue::start(config("0"));
        queue.new_game(NewGame::single("alice")).await.unwrap();
        queue.end_game("alice").await.unwrap();
        assert_eq!(
            queue.end_game("alice").await,
            Err(RelayError::NoSuchGame("alice".into()))
        );

        queue.new_game(NewGame::single("alice")).await.unwrap();
        assert_eq!(
            played(queue.call("alice", Action::Move("e4".into())).await).1,
            Some("e5".to_string())
        );
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_stop_settles_everything() {
        let queue = PlayQueue::start(config("0.2"));
        queue.new_game(NewGame::single("alice")).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        for position in ["e4", "d4"] {
            let tx = tx.clone();
            let command = Command::new("alice", Action::Move(position.into()), move |done| {
                let _ = tx.send(done);
            });
            queue.submit(command).unwrap();
        }
        drop(tx);

        queue.stop().await;
        let mut settled = 0;
        while let Some(done) = rx.recv().await {
            assert!(done.is_done());
            settled += 1;
        }
        assert_eq!(settled, 2);

        assert!(!queue.is_running());
        assert!(queue.players().is_empty());
        let late = Command::new("alice", Action::Fen, |_| {});
        assert_eq!(queue.submit(late), Err(RelayError::QueueStopped));
        assert_eq!(
            queue.new_game(NewGame::single("bob")).await,
            Err(RelayError::QueueStopped)
        );
    }
}
