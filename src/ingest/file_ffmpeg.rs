//! FFmpeg-backed local file decoder.
//!
//! Decodes one video file sequentially to RGB24. End of file drains the
//! decoder and then reports `None`.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    fps: f64,
    frame_count: Option<u64>,
    pending: Vec<Frame>,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{}'", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{}' has no video track", path))?;
        let stream_index = input_stream.index();

        let rate = input_stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let frame_count = match input_stream.frames() {
            n if n > 0 => Some(n as u64),
            _ => None,
        };

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!("FileSource: opened {} ({:.2} fps)", path, fps);

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            fps,
            frame_count,
            pending: Vec::new(),
            eof_sent: false,
        })
    }

    pub(crate) fn fps(&self) -> f64 {
        self.fps
    }

    pub(crate) fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.pop_pending() {
                return Ok(Some(frame));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut sent_packet = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                sent_packet = true;
                break;
            }
            if !sent_packet {
                self.decoder
                    .send_eof()
                    .context("flush ffmpeg decoder")?;
                self.eof_sent = true;
            }
            self.drain_decoder()?;
        }
    }

    fn pop_pending(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    fn drain_decoder(&mut self) -> Result<()> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            self.scaler
                .run(&decoded, &mut rgb_frame)
                .context("scale frame to RGB")?;
            self.pending.push(frame_from_rgb(&rgb_frame)?);
        }
        Ok(())
    }
}

fn frame_from_rgb(frame: &ffmpeg::frame::Video) -> Result<Frame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Frame::new(data.to_vec(), width, height);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Frame::new(pixels, width, height)
}
