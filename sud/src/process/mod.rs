/// Frame packing and the stream clock.
///
/// Provides [`pack_audio_frame`](frame::pack_audio_frame) /
/// [`unpack_audio_frame`](frame::unpack_audio_frame), which wrap a
/// [`FrameCodec`](crate::codec::FrameCodec) with the storage byte swap, and
/// [`FrameClock`](frame::FrameClock), which derives chunk timestamps.
pub mod frame;

/// Stream reading.
///
/// Provides the [`SudReader`](read::SudReader), yielding
/// [`AudioFrame`](read::AudioFrame) objects with decoded PCM.
pub mod read;

/// Stream writing.
///
/// Provides the [`SudWriter`](write::SudWriter), which emits the file header,
/// the handler metadata and one audio chunk per write.
pub mod write;
