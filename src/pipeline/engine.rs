//! Play/record state machine
//!
//! One thread owns everything: the frame stream, the clock anchors, the
//! pointer and the samples. Playback and logging share a single
//! [`RunState`], so they can never drift apart.

use std::io::Read;
use std::time::Duration;

use metrics::{counter, histogram};
use tracing::{debug, error, info, instrument, warn};

use crate::capture::{Frame, FrameStream, Size};
use crate::error::{Result, TrackerError};
use crate::pipeline::clock::{Pacing, PlaybackClock, Timer};
use crate::pipeline::decimator::{Sample, SampleDecimator};
use crate::pipeline::mapper::{CoordinateMapper, PreviewPoint};
use crate::utils::FpsMeter;
use crate::Config;

/// Input is polled once per this many dropped frames during catch-up
const CATCH_UP_POLL_INTERVAL: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Paused,
    Running,
}

/// Input delivered by the display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Pointer moved or clicked, in preview pixels
    Pointer(PreviewPoint),
    /// Start / pause / resume
    Toggle,
    /// Quit key or window closed
    Quit,
}

/// Overlay data handed to the surface with every frame
#[derive(Debug, Clone, PartialEq)]
pub struct Hud {
    pub state: RunState,
    /// False until the first start
    pub started: bool,
    pub preview_ms: f64,
    pub samples: usize,
    pub speed: f64,
    pub live_fps: f64,
    pub pointer: Option<PreviewPoint>,
}

/// Display and input collaborator
pub trait Surface {
    /// Drain input received since the last call
    fn poll_input(&mut self) -> Vec<Input>;

    fn present(&mut self, frame: &Frame, hud: &Hud) -> color_eyre::Result<()>;
}

impl<S: Surface + ?Sized> Surface for &mut S {
    fn poll_input(&mut self) -> Vec<Input> {
        (**self).poll_input()
    }

    fn present(&mut self, frame: &Frame, hud: &Hud) -> color_eyre::Result<()> {
        (**self).present(frame, hud)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Quit,
    EndOfStream,
}

/// Outcome of a finished session
#[derive(Debug, Clone)]
pub struct Session {
    pub samples: Vec<Sample>,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    /// Frame index the session stopped at
    pub frame_idx: u64,
    pub termination: Termination,
}

pub struct Engine<R, S, T> {
    stream: FrameStream<R>,
    surface: S,
    timer: T,
    pacing: Pacing,
    mapper: CoordinateMapper,
    decimator: SampleDecimator,
    idle: Duration,

    state: RunState,
    started: bool,
    clock: PlaybackClock,
    frame_idx: u64,
    pointer: Option<PreviewPoint>,
    current: Frame,
    /// First frame, shown while paused and played as frame 0
    primed: Option<Frame>,
    preview_ms: f64,

    fps: FpsMeter,
    frames_presented: u64,
    frames_dropped: u64,
}

impl<R: Read, S: Surface, T: Timer> Engine<R, S, T> {
    /// Pulls the first frame so there is something to show while paused.
    #[instrument(skip_all, fields(original = %original))]
    pub fn new(
        mut stream: FrameStream<R>,
        surface: S,
        timer: T,
        original: Size,
        config: &Config,
    ) -> Result<Self> {
        let first = stream.pull().ok_or(TrackerError::EmptyStream)?;
        let pacing = Pacing::from_config(&config.preview);
        let clock = PlaybackClock::start(timer.now(), 0, pacing);

        info!(
            max_lag = ?pacing.max_lag,
            "preview {} @ {}fps, {}x speed, sampling {}Hz",
            stream.size(),
            pacing.rate,
            pacing.speed,
            config.sampling.rate_hz
        );

        Ok(Self {
            mapper: CoordinateMapper::new(stream.size(), original),
            stream,
            surface,
            timer,
            pacing,
            decimator: SampleDecimator::new(config.sampling.rate_hz),
            idle: Duration::from_millis(config.display.idle_poll_ms),
            state: RunState::Paused,
            started: false,
            clock,
            frame_idx: 0,
            pointer: None,
            current: first.clone(),
            primed: Some(first),
            preview_ms: 0.0,
            fps: FpsMeter::new(),
            frames_presented: 0,
            frames_dropped: 0,
        })
    }

    pub fn run(mut self) -> Session {
        let termination = loop {
            if self.handle_input() {
                break Termination::Quit;
            }

            match self.state {
                RunState::Paused => {
                    if !self.present() {
                        break Termination::Quit;
                    }
                    self.timer.sleep(self.idle);
                }
                RunState::Running => {
                    if let Some(termination) = self.step() {
                        break termination;
                    }
                    if !self.present() {
                        break Termination::Quit;
                    }
                }
            }
        };

        info!(
            ?termination,
            frames = self.frames_presented,
            dropped = self.frames_dropped,
            samples = self.decimator.len(),
            "session finished"
        );

        Session {
            frames_presented: self.frames_presented,
            frames_dropped: self.frames_dropped,
            frame_idx: self.frame_idx,
            termination,
            samples: self.decimator.into_samples(),
        }
    }

    /// Apply pending input. Returns true on quit.
    fn handle_input(&mut self) -> bool {
        for input in self.surface.poll_input() {
            match input {
                Input::Pointer(point) => self.pointer = Some(point),
                Input::Toggle => self.toggle(),
                Input::Quit => {
                    info!("quit requested");
                    return true;
                }
            }
        }
        false
    }

    fn toggle(&mut self) {
        let now = self.timer.now();
        match self.state {
            RunState::Paused => {
                if self.started {
                    self.clock.resume(now, self.frame_idx);
                    info!(frame = self.frame_idx, "RESUME");
                } else {
                    self.clock = PlaybackClock::start(now, self.frame_idx, self.pacing);
                    self.started = true;
                    info!(frame = self.frame_idx, "START");
                }
                self.state = RunState::Running;
            }
            RunState::Running => {
                self.state = RunState::Paused;
                info!(frame = self.frame_idx, samples = self.decimator.len(), "PAUSE");
            }
        }
    }

    /// Play one frame. Returns the reason to stop, if any.
    fn step(&mut self) -> Option<Termination> {
        let frame = match self.primed.take() {
            Some(frame) => frame,
            None => match self.stream.pull() {
                Some(frame) => frame,
                None => return Some(Termination::EndOfStream),
            },
        };
        self.current = frame;

        let now = self.timer.now();
        if self.clock.needs_catch_up(self.frame_idx, now) {
            let lag = self.clock.lag(self.frame_idx, now);
            let Some(dropped) = self.catch_up() else {
                return Some(Termination::Quit);
            };
            warn!(
                lag_ms = lag.as_millis() as u64,
                dropped,
                frame = self.frame_idx,
                "behind schedule, dropped frames"
            );
            if self.state == RunState::Paused {
                // paused mid catch-up: the held frame plays first on resume
                self.primed = Some(self.current.clone());
                return None;
            }
        }

        let target = self.clock.target_time(self.frame_idx);
        let lag = self.clock.lag(self.frame_idx, self.timer.now());
        histogram!("pacing_lag_ms").record(lag.as_secs_f64() * 1000.0);
        self.timer.sleep_until(target);

        self.preview_ms = self.pacing.frame_ms(self.frame_idx);
        let position = self.mapper.map(self.pointer);
        if self.decimator.offer(self.preview_ms, position) {
            debug!(t_ms = self.preview_ms, ?position, "sample");
        }

        self.frame_idx += 1;
        None
    }

    /// Pull and discard frames until the held frame is no longer behind
    /// the wall clock. Discarded frames are neither shown nor sampled.
    ///
    /// A decoder slower than `rate * speed` never catches up, so input is
    /// still polled every few drops. Returns the drop count, or `None` on quit.
    fn catch_up(&mut self) -> Option<u64> {
        let mut dropped = 0;
        let mut quit = false;
        while self.clock.is_behind(self.frame_idx, self.timer.now()) {
            if dropped > 0 && dropped % CATCH_UP_POLL_INTERVAL == 0 {
                if self.handle_input() {
                    quit = true;
                    break;
                }
                if self.state != RunState::Running {
                    break;
                }
            }
            match self.stream.pull() {
                Some(frame) => {
                    self.current = frame;
                    self.frame_idx += 1;
                    dropped += 1;
                }
                None => break,
            }
        }
        self.frames_dropped += dropped;
        counter!("frames_dropped").increment(dropped);
        (!quit).then_some(dropped)
    }

    fn hud(&self) -> Hud {
        Hud {
            state: self.state,
            started: self.started,
            preview_ms: self.preview_ms,
            samples: self.decimator.len(),
            speed: self.pacing.speed,
            live_fps: self.fps.fps(),
            pointer: self.pointer,
        }
    }

    /// Returns false if the surface is gone.
    fn present(&mut self) -> bool {
        if self.state == RunState::Running {
            self.fps.tick(self.timer.now());
        }

        let hud = self.hud();
        if let Err(e) = self.surface.present(&self.current, &hud) {
            error!("display failed: {:#}", e);
            return false;
        }

        if self.state == RunState::Running {
            self.frames_presented += 1;
            counter!("frames_presented").increment(1);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;
    use color_eyre::eyre::eyre;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::rc::Rc;
    use std::time::Instant;

    const PREVIEW: Size = Size {
        width: 16,
        height: 16,
    };

    /// Virtual clock: sleeping advances time instantly
    #[derive(Clone)]
    struct ManualTimer {
        now: Rc<Cell<Instant>>,
    }

    impl ManualTimer {
        fn new(t0: Instant) -> Self {
            Self {
                now: Rc::new(Cell::new(t0)),
            }
        }

        fn advance(&self, d: Duration) {
            self.now.set(self.now.get() + d);
        }
    }

    impl Timer for ManualTimer {
        fn now(&self) -> Instant {
            self.now.get()
        }

        fn sleep(&mut self, duration: Duration) {
            self.advance(duration);
        }
    }

    /// Replays one batch of input per loop iteration
    struct ScriptedSurface {
        script: VecDeque<Vec<Input>>,
        timer: ManualTimer,
        /// Stall the clock after presenting this many running frames
        stall: Option<(u64, Duration)>,
        fail_after: Option<usize>,
        running_presents: u64,
        huds: Vec<Hud>,
    }

    impl ScriptedSurface {
        fn new(timer: &ManualTimer, script: Vec<Vec<Input>>) -> Self {
            Self {
                script: script.into(),
                timer: timer.clone(),
                stall: None,
                fail_after: None,
                running_presents: 0,
                huds: Vec::new(),
            }
        }
    }

    impl Surface for ScriptedSurface {
        fn poll_input(&mut self) -> Vec<Input> {
            self.script.pop_front().unwrap_or_default()
        }

        fn present(&mut self, _frame: &Frame, hud: &Hud) -> color_eyre::Result<()> {
            if self.fail_after == Some(self.huds.len()) {
                return Err(eyre!("window destroyed"));
            }
            self.huds.push(hud.clone());
            if hud.state == RunState::Running {
                self.running_presents += 1;
                if let Some((after, stall)) = self.stall {
                    if self.running_presents == after {
                        self.timer.advance(stall);
                    }
                }
            }
            Ok(())
        }
    }

    fn frames(count: usize) -> FrameStream<Cursor<Vec<u8>>> {
        let len = PREVIEW.frame_len(PixelFormat::Bgr24);
        FrameStream::new(
            Cursor::new(vec![7u8; len * count]),
            PREVIEW,
            PixelFormat::Bgr24,
        )
    }

    fn config(fps: f64, sample_rate: f64, max_lag: f64) -> Config {
        let mut config = Config::default();
        config.preview.fps = fps;
        config.preview.speed = 1.0;
        config.preview.max_lag_to_drop = max_lag;
        config.sampling.rate_hz = sample_rate;
        config
    }

    fn start_at(x: i32, y: i32) -> Vec<Input> {
        vec![Input::Pointer(PreviewPoint::new(x, y)), Input::Toggle]
    }

    fn times(session: &Session) -> Vec<f64> {
        session.samples.iter().map(|s| s.t_ms).collect()
    }

    fn assert_near(actual: Instant, expected: Instant) {
        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        assert!(diff < Duration::from_millis(1), "off by {:?}", diff);
    }

    #[test]
    fn plays_to_end_of_stream_with_decimated_samples() {
        let t0 = Instant::now();
        let timer = ManualTimer::new(t0);
        let mut surface = ScriptedSurface::new(&timer, vec![start_at(10, 10)]);

        let engine = Engine::new(
            frames(40),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.0),
        )
        .unwrap();
        let session = engine.run();

        assert_eq!(session.termination, Termination::EndOfStream);
        assert_eq!(session.frames_presented, 40);
        assert_eq!(session.frames_dropped, 0);
        assert_eq!(session.frame_idx, 40);
        assert_eq!(
            times(&session),
            vec![0.0, 500.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0, 3500.0]
        );
        assert!(session.samples.iter().all(|s| s.x == 10 && s.y == 10));

        // last frame was due 3.9s after the start
        assert_near(timer.now(), t0 + Duration::from_millis(3900));
    }

    #[test]
    fn maps_pointer_into_original_space() {
        let timer = ManualTimer::new(Instant::now());
        let mut surface = ScriptedSurface::new(&timer, vec![start_at(5, 3)]);

        let session = Engine::new(
            frames(3),
            &mut surface,
            timer.clone(),
            Size::new(PREVIEW.width * 3, PREVIEW.height * 3),
            &config(10.0, 2.0, 0.0),
        )
        .unwrap()
        .run();

        assert_eq!(session.samples.len(), 1);
        assert_eq!((session.samples[0].x, session.samples[0].y), (15, 9));
    }

    #[test]
    fn pause_keeps_samples_and_resume_does_not_jump() {
        let t0 = Instant::now();
        let timer = ManualTimer::new(t0);

        // frames 0..=9 play in iterations 0..=9, pause for 50 idle ticks
        // of 20ms, then resume
        let mut script = vec![start_at(4, 4)];
        script.extend(std::iter::repeat(Vec::new()).take(9));
        script.push(vec![Input::Toggle]);
        script.extend(std::iter::repeat(Vec::new()).take(49));
        script.push(vec![Input::Toggle]);

        let mut surface = ScriptedSurface::new(&timer, script);
        let session = Engine::new(
            frames(30),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.0),
        )
        .unwrap()
        .run();

        assert_eq!(session.termination, Termination::EndOfStream);
        assert_eq!(session.frames_presented, 30);
        assert_eq!(
            times(&session),
            vec![0.0, 500.0, 1000.0, 1500.0, 2000.0, 2500.0]
        );

        let paused: Vec<&Hud> = surface
            .huds
            .iter()
            .filter(|h| h.state == RunState::Paused)
            .collect();
        assert_eq!(paused.len(), 50);
        // timestamp frozen at the last played frame while paused
        assert!(paused.iter().all(|h| h.preview_ms == 900.0 && h.samples == 2));

        // 0.9s of play, 1s paused, then frames 10..=29 on schedule
        assert_near(timer.now(), t0 + Duration::from_millis(900 + 1000 + 1900));
    }

    #[test]
    fn primed_frame_is_shown_while_paused_and_played_first() {
        let timer = ManualTimer::new(Instant::now());
        let script = vec![
            vec![Input::Pointer(PreviewPoint::new(1, 1))],
            Vec::new(),
            vec![Input::Toggle],
        ];
        let mut surface = ScriptedSurface::new(&timer, script);
        let session = Engine::new(
            frames(5),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 100.0, 0.0),
        )
        .unwrap()
        .run();

        assert_eq!(surface.huds[0].state, RunState::Paused);
        assert!(!surface.huds[0].started);
        assert_eq!(session.frames_presented, 5);
        assert_eq!(times(&session), vec![0.0, 100.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn quit_while_running_keeps_samples() {
        let timer = ManualTimer::new(Instant::now());
        let script = vec![start_at(2, 2), Vec::new(), vec![Input::Quit]];
        let mut surface = ScriptedSurface::new(&timer, script);

        let session = Engine::new(
            frames(40),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 100.0, 0.0),
        )
        .unwrap()
        .run();

        assert_eq!(session.termination, Termination::Quit);
        assert_eq!(session.frames_presented, 2);
        assert_eq!(session.frame_idx, 2);
        assert_eq!(times(&session), vec![0.0, 100.0]);
    }

    #[test]
    fn quit_before_start_records_nothing() {
        let timer = ManualTimer::new(Instant::now());
        let mut surface = ScriptedSurface::new(&timer, vec![Vec::new(), vec![Input::Quit]]);

        let session = Engine::new(
            frames(10),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.0),
        )
        .unwrap()
        .run();

        assert_eq!(session.termination, Termination::Quit);
        assert_eq!(session.frames_presented, 0);
        assert!(session.samples.is_empty());
    }

    #[test]
    fn no_samples_without_pointer() {
        let timer = ManualTimer::new(Instant::now());
        let mut surface = ScriptedSurface::new(&timer, vec![vec![Input::Toggle]]);

        let session = Engine::new(
            frames(20),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.0),
        )
        .unwrap()
        .run();

        assert_eq!(session.frames_presented, 20);
        assert!(session.samples.is_empty());
    }

    #[test]
    fn catch_up_drops_frames_when_far_behind() {
        let t0 = Instant::now();
        let timer = ManualTimer::new(t0);
        let mut surface = ScriptedSurface::new(&timer, vec![start_at(1, 1)]);
        // frame 2 is presented at 0.2s, then the display hangs until 2.25s
        surface.stall = Some((3, Duration::from_millis(2050)));

        let session = Engine::new(
            frames(40),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.5),
        )
        .unwrap()
        .run();

        // 2.25s implies frame 22: frames 3..=21 are skipped
        assert_eq!(session.frames_dropped, 19);
        assert_eq!(session.frames_presented, 21);
        assert_eq!(session.frame_idx, 40);
        assert_eq!(times(&session), vec![0.0, 2200.0, 2700.0, 3200.0, 3700.0]);
    }

    #[test]
    fn catch_up_stops_at_end_of_stream() {
        let timer = ManualTimer::new(Instant::now());
        let mut surface = ScriptedSurface::new(&timer, vec![start_at(1, 1)]);
        surface.stall = Some((3, Duration::from_secs(100)));

        let session = Engine::new(
            frames(40),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.5),
        )
        .unwrap()
        .run();

        assert_eq!(session.termination, Termination::EndOfStream);
        // frame 3 was held, 4..=39 pulled, the last one is still played
        assert_eq!(session.frames_dropped, 36);
        assert_eq!(session.frames_presented, 4);
        assert_eq!(session.frame_idx, 40);
        assert_eq!(times(&session), vec![0.0, 3900.0]);
    }

    #[test]
    fn quit_is_honoured_while_catching_up() {
        let timer = ManualTimer::new(Instant::now());
        // the fifth batch is only read by catch-up, after 8 drops
        let script = vec![
            start_at(1, 1),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            vec![Input::Quit],
        ];
        let mut surface = ScriptedSurface::new(&timer, script);
        surface.stall = Some((3, Duration::from_secs(100)));

        let session = Engine::new(
            frames(40),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.5),
        )
        .unwrap()
        .run();

        assert_eq!(session.termination, Termination::Quit);
        assert_eq!(session.frames_dropped, CATCH_UP_POLL_INTERVAL);
        assert_eq!(session.frames_presented, 3);
        assert_eq!(session.frame_idx, 3 + CATCH_UP_POLL_INTERVAL);
        assert_eq!(times(&session), vec![0.0]);
    }

    #[test]
    fn pause_during_catch_up_holds_the_frame_for_resume() {
        let timer = ManualTimer::new(Instant::now());
        let script = vec![
            start_at(1, 1),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            vec![Input::Toggle],
            vec![Input::Toggle],
        ];
        let mut surface = ScriptedSurface::new(&timer, script);
        surface.stall = Some((3, Duration::from_secs(100)));

        let session = Engine::new(
            frames(40),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.5),
        )
        .unwrap()
        .run();

        assert_eq!(session.termination, Termination::EndOfStream);
        assert_eq!(session.frames_dropped, 8);
        // frames 0..=2, then the held frame 11 through 39
        assert_eq!(session.frames_presented, 3 + 29);
        assert_eq!(
            times(&session),
            vec![0.0, 1100.0, 1600.0, 2100.0, 2600.0, 3100.0, 3600.0]
        );

        let paused: Vec<&Hud> = surface
            .huds
            .iter()
            .filter(|h| h.state == RunState::Paused && h.started)
            .collect();
        assert_eq!(paused.len(), 1);
        assert_eq!(paused[0].preview_ms, 200.0);
    }

    #[test]
    fn strict_pacing_plays_every_frame_late() {
        let t0 = Instant::now();
        let timer = ManualTimer::new(t0);
        let mut surface = ScriptedSurface::new(&timer, vec![start_at(1, 1)]);
        surface.stall = Some((3, Duration::from_secs(5)));

        let session = Engine::new(
            frames(40),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.0),
        )
        .unwrap()
        .run();

        assert_eq!(session.frames_dropped, 0);
        assert_eq!(session.frames_presented, 40);
        assert_eq!(session.samples.len(), 8);
        // frames after the stall never wait, and nothing catches up
        assert_near(timer.now(), t0 + Duration::from_millis(200 + 5000));
    }

    #[test]
    fn display_failure_ends_session_like_quit() {
        let timer = ManualTimer::new(Instant::now());
        let mut surface = ScriptedSurface::new(&timer, vec![start_at(3, 3)]);
        surface.fail_after = Some(6);

        let session = Engine::new(
            frames(40),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &config(10.0, 2.0, 0.0),
        )
        .unwrap()
        .run();

        assert_eq!(session.termination, Termination::Quit);
        assert_eq!(session.frames_presented, 6);
        assert_eq!(times(&session), vec![0.0, 500.0]);
    }

    #[test]
    fn empty_stream_fails_at_startup() {
        let timer = ManualTimer::new(Instant::now());
        let mut surface = ScriptedSurface::new(&timer, Vec::new());
        let result = Engine::new(
            frames(0),
            &mut surface,
            timer.clone(),
            PREVIEW,
            &Config::default(),
        );
        assert!(matches!(result, Err(TrackerError::EmptyStream)));
    }
}
