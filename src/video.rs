use anyhow::Ok;
use ffmpeg::encoder;
use ffmpeg::util::frame::audio::Audio;
use ffmpeg_next::{
    self as ffmpeg, channel_layout, codec, decoder, filter, format, media, Error, Packet, Rational,
};
use std::path::Path;

use crate::capture;
use crate::error::TranscriptionError;
use crate::transcribe::AudioEncoder;

/// Fixed profile for the transcription upload.
pub(crate) const MP3_BIT_RATE: usize = 128_000;

/// Transcodes the best audio stream of a video into an mp3 file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mp3Encoder {
    bit_rate: usize,
}

impl Default for Mp3Encoder {
    fn default() -> Self {
        Self {
            bit_rate: MP3_BIT_RATE,
        }
    }
}

impl AudioEncoder for Mp3Encoder {
    fn encode(&self, video: &Path, audio: &Path) -> Result<(), TranscriptionError> {
        transcode_audio(video, audio, self.bit_rate)
            .map_err(|e| TranscriptionError::EncodeFailed(format!("{e:#}")))
    }
}

struct AudioTranscoder {
    decoder: decoder::Audio,
    encoder: encoder::Audio,
    filter_graph: filter::Graph,
    encoder_time_base: Rational,
    next_pts: i64,
}

impl AudioTranscoder {
    fn new(
        input_stream: &format::stream::Stream,
        output: &mut format::context::Output,
        bit_rate: usize,
    ) -> anyhow::Result<Self> {
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);
        let decoder = codec::context::Context::from_parameters(input_stream.parameters())?
            .decoder()
            .audio()?;
        // Some containers leave the layout unset and only report a channel count.
        let input_layout = if decoder.channel_layout().is_empty() {
            channel_layout::ChannelLayout::default(decoder.channels() as i32)
        } else {
            decoder.channel_layout()
        };

        let codec = encoder::find(codec::Id::MP3)
            .ok_or(anyhow::anyhow!(Error::EncoderNotFound))?
            .audio()?;
        let mut output_stream = output.add_stream(codec)?;
        let context = codec::context::Context::from_parameters(output_stream.parameters())?;
        let mut encoder = context.encoder().audio()?;

        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let channel_layout = codec
            .channel_layouts()
            .map(|layouts| layouts.best(input_layout.channels()))
            .unwrap_or(channel_layout::ChannelLayout::STEREO);
        let rate = supported_rate(&codec, decoder.rate() as i32);
        let encoder_time_base = Rational(1, rate);

        encoder.set_channel_layout(channel_layout);
        encoder.set_rate(rate);
        encoder.set_format(
            codec
                .formats()
                .ok_or(anyhow::anyhow!("Unknown supported formats"))?
                .next()
                .ok_or(anyhow::anyhow!("Failed to get sample format"))?,
        );
        encoder.set_bit_rate(bit_rate);
        encoder.set_max_bit_rate(bit_rate);
        encoder.set_time_base(encoder_time_base);
        output_stream.set_time_base(encoder_time_base);

        let opened_encoder = encoder.open_as(codec)?;
        output_stream.set_parameters(&opened_encoder);

        let filter_graph = Self::filter_graph(
            input_stream.time_base(),
            input_layout,
            &decoder,
            &opened_encoder,
        )?;

        Ok(Self {
            decoder,
            encoder: opened_encoder,
            filter_graph,
            encoder_time_base,
            next_pts: 0,
        })
    }

    fn filter_graph(
        input_time_base: Rational,
        input_layout: channel_layout::ChannelLayout,
        decoder: &codec::decoder::Audio,
        encoder: &codec::encoder::Audio,
    ) -> anyhow::Result<filter::Graph> {
        let mut filter_graph = filter::Graph::new();

        let args = format!(
            "time_base={}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
            input_time_base,
            decoder.rate(),
            decoder.format().name(),
            input_layout.bits()
        );

        filter_graph.add(
            &filter::find("abuffer").ok_or(anyhow::anyhow!("Failed to find filter"))?,
            "in",
            &args,
        )?;
        filter_graph.add(
            &filter::find("abuffersink").ok_or(anyhow::anyhow!("Failed to find filter"))?,
            "out",
            "",
        )?;

        {
            let mut out = filter_graph
                .get("out")
                .ok_or(anyhow::anyhow!("Failed to get filter"))?;
            out.set_sample_format(encoder.format());
            out.set_channel_layout(encoder.channel_layout());
            out.set_sample_rate(encoder.rate());
        }

        filter_graph.output("in", 0)?.input("out", 0)?.parse("anull")?;
        filter_graph.validate()?;

        tracing::debug!(graph = %filter_graph.dump(), "audio filter graph");

        if let Some(codec) = encoder.codec() {
            if !codec
                .capabilities()
                .contains(ffmpeg::codec::capabilities::Capabilities::VARIABLE_FRAME_SIZE)
            {
                filter_graph
                    .get("out")
                    .ok_or(anyhow::anyhow!("Failed to get filter"))?
                    .sink()
                    .set_frame_size(encoder.frame_size());
            }
        }

        Ok(filter_graph)
    }

    fn send_packet_to_decoder(&mut self, packet: &Packet) -> anyhow::Result<()> {
        self.decoder
            .send_packet(packet)
            .map_err(anyhow::Error::from)
    }

    fn send_eof_to_decoder(&mut self) -> anyhow::Result<()> {
        self.decoder.send_eof().map_err(anyhow::Error::from)
    }

    fn receive_and_process_decoded_frames(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> anyhow::Result<()> {
        let mut frame = Audio::empty();
        while self.decoder.receive_frame(&mut frame).is_ok() {
            self.filter_graph
                .get("in")
                .ok_or(anyhow::anyhow!("Failed to get filter"))?
                .source()
                .add(&frame)
                .map_err(|e| anyhow::anyhow!(e))?;
            self.receive_and_process_filtered_frames(output, output_stream_time_base)?;
        }
        Ok(())
    }

    fn flush_filter_graph(&mut self) -> anyhow::Result<()> {
        self.filter_graph
            .get("in")
            .ok_or(anyhow::anyhow!("Failed to get filter"))?
            .source()
            .flush()
            .map_err(|e| anyhow::anyhow!(e))
    }

    fn receive_and_process_filtered_frames(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> anyhow::Result<()> {
        let mut frame = Audio::empty();
        while self
            .filter_graph
            .get("out")
            .ok_or(anyhow::anyhow!("Failed to get filter"))?
            .sink()
            .frame(&mut frame)
            .is_ok()
        {
            // Timestamps restart from zero in sample units of the encoder.
            frame.set_pts(Some(self.next_pts));
            self.next_pts += frame.samples() as i64;
            self.encoder.send_frame(&frame)?;
            self.receive_and_process_encoded_packets(output, output_stream_time_base)?;
        }
        Ok(())
    }

    fn send_eof_to_encoder(&mut self) -> anyhow::Result<()> {
        self.encoder.send_eof().map_err(anyhow::Error::from)
    }

    fn receive_and_process_encoded_packets(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> anyhow::Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.encoder_time_base, output_stream_time_base);
            packet.write_interleaved(output)?;
        }
        Ok(())
    }
}

fn supported_rate(codec: &codec::Audio, wanted: i32) -> i32 {
    let rates: Vec<i32> = match codec.rates() {
        Some(rates) => rates.collect(),
        None => return wanted,
    };
    if rates.is_empty() || rates.contains(&wanted) {
        return wanted;
    }
    rates
        .into_iter()
        .min_by_key(|rate| (rate - wanted).abs())
        .unwrap_or(44_100)
}

/// Writes the audio track of `input_path` to `output_path`; the container is
/// chosen from the output extension.
pub(crate) fn transcode_audio(
    input_path: &Path,
    output_path: &Path,
    bit_rate: usize,
) -> anyhow::Result<()> {
    capture::init()?;
    let mut input = format::input(&input_path)?;
    // Look the track up first so a silent video leaves no empty output file.
    let input_stream = input
        .streams()
        .best(media::Type::Audio)
        .ok_or(anyhow::anyhow!("video has no audio track"))?;
    let input_stream_index = input_stream.index();
    let mut output = format::output(&output_path)?;
    let mut transcoder = AudioTranscoder::new(&input_stream, &mut output, bit_rate)?;

    output.write_header()?;
    let output_stream_time_base = output
        .stream(0)
        .ok_or(anyhow::anyhow!(Error::StreamNotFound))?
        .time_base();

    for (stream, packet) in input.packets() {
        if stream.index() != input_stream_index {
            continue;
        }
        transcoder.send_packet_to_decoder(&packet)?;
        transcoder.receive_and_process_decoded_frames(&mut output, output_stream_time_base)?;
    }

    transcoder.send_eof_to_decoder()?;
    transcoder.receive_and_process_decoded_frames(&mut output, output_stream_time_base)?;
    transcoder.flush_filter_graph()?;
    transcoder.receive_and_process_filtered_frames(&mut output, output_stream_time_base)?;
    transcoder.send_eof_to_encoder()?;
    transcoder.receive_and_process_encoded_packets(&mut output, output_stream_time_base)?;

    output.write_trailer()?;

    tracing::debug!(audio = %output_path.display(), "audio track encoded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_an_encode_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Mp3Encoder::default()
            .encode(&dir.path().join("absent.mp4"), &dir.path().join("absent.mp3"))
            .unwrap_err();
        assert!(matches!(err, TranscriptionError::EncodeFailed(_)));
        assert!(!dir.path().join("absent.mp3").exists());
    }

    #[test]
    fn input_without_audio_leaves_no_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A 2x2 binary PPM still image: readable by libav, no audio stream.
        let image = dir.path().join("still.ppm");
        let mut ppm = b"P6\n2 2\n255\n".to_vec();
        ppm.extend_from_slice(&[255; 12]);
        std::fs::write(&image, ppm).expect("write image");
        let audio = dir.path().join("still.mp3");

        let err = Mp3Encoder::default().encode(&image, &audio).unwrap_err();

        assert!(matches!(err, TranscriptionError::EncodeFailed(_)));
        assert!(!audio.exists());
    }
}
