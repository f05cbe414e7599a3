//! Regular video playback on FFmpeg.
//!
//! Decoding runs on a dedicated thread. Commands reach it over an unbounded
//! channel; decoded frames come back through a small bounded queue, so a
//! UI that stops polling also stops the decoder.

use crate::error::ViewerError;
use crate::image_pipeline::Frame;
use ffmpeg_next::format::{self, Pixel};
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{self, Flags};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Frames the decoder may run ahead of the UI.
const EVENT_QUEUE: usize = 2;

/// How long an idle decoder waits before checking for commands again.
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// FFmpeg seeks in `AV_TIME_BASE` units.
const SEEK_UNITS_PER_SEC: f64 = 1_000_000.0;

static FFMPEG_INIT: OnceLock<Result<(), String>> = OnceLock::new();

fn init_ffmpeg() -> Result<(), String> {
    FFMPEG_INIT
        .get_or_init(|| {
            ffmpeg_next::init().map_err(|err| format!("FFmpeg initialization failed: {err}"))?;
            ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
            Ok(())
        })
        .clone()
}

/// Container facts read before playback starts.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    /// From the stream's average frame rate, when it declares one.
    pub frame_interval: Option<Duration>,
}

/// Opens the container and its best video stream without decoding frames.
pub async fn open_video(path: PathBuf) -> Result<VideoInfo, ViewerError> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || read_info(&path))
        .await
        .map_err(|err| ViewerError::Playback(format!("{display}: {err}")))?
        .map_err(|err| ViewerError::Playback(format!("{display}: {err}")))
}

fn read_info(path: &Path) -> Result<VideoInfo, String> {
    init_ffmpeg()?;

    let input = format::input(&path).map_err(|err| format!("cannot open video ({err})"))?;
    let stream = input
        .streams()
        .best(Type::Video)
        .ok_or_else(|| "no video stream".to_string())?;

    let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
        .and_then(|context| context.decoder().video())
        .map_err(|err| format!("unsupported video codec ({err})"))?;
    let (width, height) = (decoder.width(), decoder.height());
    if width == 0 || height == 0 {
        return Err(format!("invalid video dimensions {width}x{height}"));
    }

    let duration_secs = if stream.duration() > 0 {
        stream.duration() as f64 * rational(stream.time_base())
    } else if input.duration() > 0 {
        input.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
    } else {
        0.0
    };

    let fps = rational(stream.avg_frame_rate());
    let frame_interval = (fps.is_finite() && fps > 0.0)
        .then(|| Duration::try_from_secs_f64(1.0 / fps).ok())
        .flatten();

    Ok(VideoInfo {
        path: path.to_path_buf(),
        width,
        height,
        duration_secs,
        frame_interval,
    })
}

fn rational(value: ffmpeg_next::Rational) -> f64 {
    if value.denominator() == 0 {
        return 0.0;
    }
    f64::from(value.numerator()) / f64::from(value.denominator())
}

#[derive(Debug, Clone, PartialEq)]
enum DecoderCommand {
    Play,
    Pause,
    /// Jumps to `target_secs`; a paused decoder shows one frame there.
    Seek { target_secs: f64 },
    Stop,
}

#[derive(Debug)]
enum DecoderEvent {
    Frame { frame: Frame, pts_secs: f64 },
    EndOfStream,
    Error(String),
}

/// One playing (or paused) regular video.
#[derive(Debug)]
pub struct VideoPlayer {
    info: VideoInfo,
    commands: mpsc::UnboundedSender<DecoderCommand>,
    events: mpsc::Receiver<DecoderEvent>,
    frame: Option<Frame>,
    position_secs: f64,
    playing: bool,
    at_end: bool,
    loop_playback: bool,
}

impl VideoPlayer {
    /// Spawns the decoder and asks it for the first frame.
    pub fn start(info: VideoInfo, loop_playback: bool) -> Result<Self, ViewerError> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let path = info.path.clone();
        thread::Builder::new()
            .name("video-decoder".into())
            .spawn(move || {
                if let Err(err) = decode_loop(&path, command_rx, &event_tx) {
                    log::warn!("{}: {err}", path.display());
                    let _ = event_tx.blocking_send(DecoderEvent::Error(err));
                }
            })
            .map_err(|err| ViewerError::Playback(format!("cannot start decoder: {err}")))?;

        let mut player = Self::with_channels(info, command_tx, event_rx, loop_playback);
        player.seek(0.0);
        Ok(player)
    }

    fn with_channels(
        info: VideoInfo,
        commands: mpsc::UnboundedSender<DecoderCommand>,
        events: mpsc::Receiver<DecoderEvent>,
        loop_playback: bool,
    ) -> Self {
        Self {
            info,
            commands,
            events,
            frame: None,
            position_secs: 0.0,
            playing: false,
            at_end: false,
            loop_playback,
        }
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position_secs(&self) -> f64 {
        self.position_secs
    }

    pub fn duration_secs(&self) -> f64 {
        self.info.duration_secs
    }

    pub fn play(&mut self) {
        if self.at_end {
            self.seek(0.0);
        }
        self.send(DecoderCommand::Play);
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.send(DecoderCommand::Pause);
        self.playing = false;
    }

    /// Seeks to `target_secs`, clamped to the clip.
    pub fn seek(&mut self, target_secs: f64) {
        let target_secs = if self.info.duration_secs > 0.0 {
            target_secs.clamp(0.0, self.info.duration_secs)
        } else {
            target_secs.max(0.0)
        };
        self.at_end = false;
        self.position_secs = target_secs;
        self.send(DecoderCommand::Seek { target_secs });
    }

    /// Takes every event the decoder produced since the last call. A decode
    /// failure stops playback and comes back as a playback error.
    pub fn poll(&mut self) -> Result<(), ViewerError> {
        loop {
            match self.events.try_recv() {
                Ok(DecoderEvent::Frame { frame, pts_secs }) => {
                    self.frame = Some(frame);
                    self.position_secs = pts_secs;
                }
                Ok(DecoderEvent::EndOfStream) => {
                    if self.playing && self.loop_playback {
                        self.seek(0.0);
                        self.send(DecoderCommand::Play);
                    } else {
                        self.playing = false;
                        self.at_end = true;
                    }
                }
                Ok(DecoderEvent::Error(message)) => {
                    self.playing = false;
                    return Err(ViewerError::Playback(message));
                }
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    if self.playing {
                        self.playing = false;
                        return Err(ViewerError::Playback("video decoder stopped".into()));
                    }
                    return Ok(());
                }
            }
        }
    }

    fn send(&self, command: DecoderCommand) {
        if self.commands.send(command).is_err() {
            log::debug!("{}: decoder already stopped", self.info.path.display());
        }
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        let _ = self.commands.send(DecoderCommand::Stop);
    }
}

/// Decodes on the calling thread until told to stop or until the player
/// goes away. FFmpeg contexts never leave this thread.
fn decode_loop(
    path: &Path,
    mut commands: mpsc::UnboundedReceiver<DecoderCommand>,
    events: &mpsc::Sender<DecoderEvent>,
) -> Result<(), String> {
    init_ffmpeg()?;

    let mut input = format::input(&path).map_err(|err| format!("cannot open video ({err})"))?;
    let stream = input
        .streams()
        .best(Type::Video)
        .ok_or_else(|| "no video stream".to_string())?;
    let stream_index = stream.index();
    let time_base = rational(stream.time_base());

    let mut decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
        .and_then(|context| context.decoder().video())
        .map_err(|err| format!("unsupported video codec ({err})"))?;
    let (width, height) = (decoder.width(), decoder.height());
    let mut scaler = scaling::Context::get(
        decoder.format(),
        width,
        height,
        Pixel::RGBA,
        width,
        height,
        Flags::BILINEAR,
    )
    .map_err(|err| format!("cannot convert frames to RGBA ({err})"))?;

    let mut playing = false;
    let mut single_frame = false;
    let mut decoded_any = false;
    let mut clock: Option<(Instant, f64)> = None;

    loop {
        match commands.try_recv() {
            Ok(DecoderCommand::Play) => {
                playing = true;
                clock = None;
            }
            Ok(DecoderCommand::Pause) => {
                playing = false;
                clock = None;
            }
            Ok(DecoderCommand::Seek { target_secs }) => {
                let timestamp = (target_secs * SEEK_UNITS_PER_SEC) as i64;
                if let Err(err) = input.seek(timestamp, ..timestamp) {
                    return Err(format!("seek to {target_secs:.2}s failed ({err})"));
                }
                decoder.flush();
                clock = None;
                single_frame = !playing;
            }
            Ok(DecoderCommand::Stop) | Err(TryRecvError::Disconnected) => return Ok(()),
            Err(TryRecvError::Empty) => {}
        }

        if !playing && !single_frame {
            thread::sleep(IDLE_WAIT);
            continue;
        }

        let mut raw = ffmpeg_next::frame::Video::empty();
        let mut received = decoder.receive_frame(&mut raw).is_ok();
        if !received {
            for (stream, packet) in input.packets() {
                if stream.index() != stream_index {
                    continue;
                }
                if let Err(err) = decoder.send_packet(&packet) {
                    log::debug!("{}: skipping packet ({err})", path.display());
                    continue;
                }
                if decoder.receive_frame(&mut raw).is_ok() {
                    received = true;
                    break;
                }
            }
        }

        if !received {
            if !decoded_any {
                return Err("no decodable video frames".into());
            }
            playing = false;
            single_frame = false;
            clock = None;
            if events.blocking_send(DecoderEvent::EndOfStream).is_err() {
                return Ok(());
            }
            continue;
        }

        let mut rgba = ffmpeg_next::frame::Video::empty();
        scaler
            .run(&raw, &mut rgba)
            .map_err(|err| format!("cannot convert frame ({err})"))?;
        let frame = rgba_frame(&rgba);
        let pts_secs = raw.timestamp().map_or(0.0, |pts| pts as f64 * time_base);
        decoded_any = true;

        if playing {
            let (started, first_pts) = *clock.get_or_insert((Instant::now(), pts_secs));
            if let Ok(offset) = Duration::try_from_secs_f64(pts_secs - first_pts) {
                let due = started + offset;
                let now = Instant::now();
                if due > now {
                    thread::sleep(due - now);
                }
            }
        }

        single_frame = false;
        if events
            .blocking_send(DecoderEvent::Frame { frame, pts_secs })
            .is_err()
        {
            return Ok(());
        }
    }
}

/// Copies the RGBA plane row by row; FFmpeg pads rows to its stride.
fn rgba_frame(frame: &ffmpeg_next::frame::Video) -> Frame {
    let (width, height) = (frame.width(), frame.height());
    let stride = frame.stride(0);
    let row_len = width as usize * 4;
    let data = frame.data(0);

    let mut rgba = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        rgba.extend_from_slice(&data[start..start + row_len]);
    }
    Frame::from_rgba(width, height, rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn info(duration_secs: f64) -> VideoInfo {
        VideoInfo {
            path: PathBuf::from("clip.mp4"),
            width: 2,
            height: 2,
            duration_secs,
            frame_interval: Some(Duration::from_millis(40)),
        }
    }

    fn player(
        loop_playback: bool,
    ) -> (
        VideoPlayer,
        mpsc::UnboundedReceiver<DecoderCommand>,
        mpsc::Sender<DecoderEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(8);
        let player = VideoPlayer::with_channels(info(2.0), command_tx, event_rx, loop_playback);
        (player, command_rx, event_tx)
    }

    fn frame() -> Frame {
        Frame::from_rgba(1, 1, vec![0, 0, 0, 255])
    }

    #[tokio::test]
    async fn non_video_files_are_playback_errors() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"not a video at all").expect("write file");

        let result = open_video(path).await;
        assert!(matches!(result, Err(ViewerError::Playback(_))));
    }

    #[tokio::test]
    async fn missing_files_are_playback_errors() {
        let result = open_video(PathBuf::from("/nonexistent/clip.mp4")).await;
        assert!(matches!(result, Err(ViewerError::Playback(_))));
    }

    #[test]
    fn controls_reach_the_decoder() {
        let (mut player, mut commands, _events) = player(false);

        player.play();
        player.seek(5.0);
        player.pause();

        assert_eq!(commands.try_recv(), Ok(DecoderCommand::Play));
        assert_eq!(
            commands.try_recv(),
            Ok(DecoderCommand::Seek { target_secs: 2.0 })
        );
        assert_eq!(commands.try_recv(), Ok(DecoderCommand::Pause));
        assert!(!player.is_playing());
        assert_eq!(player.position_secs(), 2.0);
    }

    #[test]
    fn decoded_frames_update_the_picture_and_position() {
        let (mut player, _commands, events) = player(false);
        events
            .try_send(DecoderEvent::Frame {
                frame: frame(),
                pts_secs: 0.8,
            })
            .expect("queue frame");

        player.poll().expect("no error");
        assert!(player.frame().is_some());
        assert_eq!(player.position_secs(), 0.8);
    }

    #[test]
    fn end_of_stream_stops_or_loops() {
        let (mut player, mut commands, events) = player(false);
        player.play();
        events.try_send(DecoderEvent::EndOfStream).expect("queue");
        player.poll().expect("no error");
        assert!(!player.is_playing());

        while commands.try_recv().is_ok() {}
        player.play();
        assert_eq!(
            commands.try_recv(),
            Ok(DecoderCommand::Seek { target_secs: 0.0 })
        );

        let (mut looping, mut commands, events) = self::player(true);
        looping.play();
        events.try_send(DecoderEvent::EndOfStream).expect("queue");
        looping.poll().expect("no error");
        assert!(looping.is_playing());
        assert_eq!(commands.try_recv(), Ok(DecoderCommand::Play));
        assert_eq!(
            commands.try_recv(),
            Ok(DecoderCommand::Seek { target_secs: 0.0 })
        );
        assert_eq!(commands.try_recv(), Ok(DecoderCommand::Play));
    }

    #[test]
    fn decode_errors_surface_as_playback_errors() {
        let (mut player, _commands, events) = player(false);
        player.play();
        events
            .try_send(DecoderEvent::Error("corrupt video packet".into()))
            .expect("queue");

        let error = player.poll().expect_err("decode failure");
        assert!(matches!(error, ViewerError::Playback(ref message) if message.contains("corrupt")));
        assert!(!player.is_playing());
    }

    #[test]
    fn a_vanished_decoder_fails_playback() {
        let (mut player, _commands, events) = player(false);
        player.play();
        drop(events);
        assert!(player.poll().is_err());
        assert!(player.poll().is_ok(), "reported once");
    }

    #[test]
    fn dropping_the_player_stops_the_decoder() {
        let (player, mut commands, _events) = player(false);
        drop(player);
        assert_eq!(commands.try_recv(), Ok(DecoderCommand::Stop));
    }
}
