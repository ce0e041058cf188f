// Call recorder tests
//
// Recording is a config-gated debugging aid: each direction of a call lands
// in its own WAV file that stays readable after finalize.

use anyhow::Result;
use janmitra_voice::audio::CallRecorder;
use tempfile::TempDir;

#[test]
fn test_recorder_writes_both_directions() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let mut recorder = CallRecorder::create(temp_dir.path(), "call-abc", 16_000, 24_000)?;
    recorder.write_outbound(&vec![0.5; 1600]);
    recorder.write_inbound(&vec![-0.5; 2400]);
    recorder.finish()?;

    // Outbound track carries the capture rate
    let outbound = hound::WavReader::open(temp_dir.path().join("call-abc-outbound.wav"))?;
    assert_eq!(outbound.spec().sample_rate, 16_000);
    assert_eq!(outbound.spec().channels, 1);
    assert_eq!(outbound.spec().bits_per_sample, 16);
    assert_eq!(outbound.len(), 1600);

    // Inbound track carries the playback rate
    let inbound = hound::WavReader::open(temp_dir.path().join("call-abc-inbound.wav"))?;
    assert_eq!(inbound.spec().sample_rate, 24_000);
    assert_eq!(inbound.len(), 2400);

    Ok(())
}

#[test]
fn test_recorded_samples_survive_the_trip() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let mut recorder = CallRecorder::create(temp_dir.path(), "call-rt", 16_000, 24_000)?;
    recorder.write_outbound(&[0.0, 0.25, -0.25, 0.5]);
    recorder.finish()?;

    let mut reader = hound::WavReader::open(temp_dir.path().join("call-rt-outbound.wav"))?;
    let samples: Vec<i16> = reader.samples::<i16>().collect::<std::result::Result<_, _>>()?;

    assert_eq!(samples, vec![0, 8192, -8192, 16384]);
    Ok(())
}

#[test]
fn test_drop_without_finish_still_produces_readable_files() -> Result<()> {
    let temp_dir = TempDir::new()?;

    {
        let mut recorder = CallRecorder::create(temp_dir.path(), "call-drop", 16_000, 24_000)?;
        recorder.write_outbound(&vec![0.1; 160]);
        // Dropped here without finish(); the Drop guard finalizes the headers
    }

    let reader = hound::WavReader::open(temp_dir.path().join("call-drop-outbound.wav"))?;
    assert_eq!(reader.len(), 160);
    Ok(())
}

#[test]
fn test_recorder_creates_missing_directory() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let nested = temp_dir.path().join("calls").join("today");

    let recorder = CallRecorder::create(&nested, "call-new", 16_000, 24_000)?;
    recorder.finish()?;

    assert!(nested.join("call-new-outbound.wav").exists());
    assert!(nested.join("call-new-inbound.wav").exists());
    Ok(())
}
