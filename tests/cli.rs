use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

fn write_tone(path: &Path, sample_rate: u32, secs: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let n = (sample_rate as f32 * secs) as usize;
    for i in 0..n {
        let t = i as f32 / sample_rate as f32;
        let s = 0.3 * (2.0 * std::f32::consts::PI * 330.0 * t).sin()
            + 0.02 * (2.0 * std::f32::consts::PI * 4100.0 * t).sin();
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn studioclean() -> Command {
    let mut cmd = Command::cargo_bin("studioclean").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_options() {
    studioclean()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--strength"))
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn processes_directory_of_wavs() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir(&input).unwrap();
    write_tone(&input.join("a.wav"), 16000, 0.5);
    write_tone(&input.join("b.wav"), 22050, 0.5);
    fs::write(input.join("notes.txt"), "ignored").unwrap();

    studioclean()
        .arg(&input)
        .args(["-f", "wav", "-j", "2", "-r", "16000", "-o"])
        .arg(&output)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("2 succeeded, 0 failed"));

    for name in ["a_studio.wav", "b_studio.wav"] {
        let reader = hound::WavReader::open(output.join(name)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
    }
}

#[test]
fn partial_failure_exits_with_two() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.wav");
    let bad = dir.path().join("bad.wav");
    write_tone(&good, 16000, 0.5);
    fs::write(&bad, b"definitely not audio").unwrap();

    studioclean()
        .arg(&good)
        .arg(&bad)
        .args(["-f", "wav", "--ffmpeg", "/nonexistent/ffmpeg", "-o"])
        .arg(dir.path().join("out"))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("FAIL  bad.wav"))
        .stdout(predicate::str::contains("1 succeeded, 1 failed"));
}

#[test]
fn invalid_config_is_fatal() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("a.wav");
    write_tone(&input, 16000, 0.2);

    studioclean()
        .arg(&input)
        .args(["--strength", "1.5"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn missing_input_is_fatal() {
    studioclean()
        .arg("/nonexistent/take.wav")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Input does not exist"));
}

#[test]
fn write_config_creates_template() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("studioclean.toml");

    studioclean().arg("--write-config").arg(&path).assert().success();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("[pipeline]"));
    assert!(content.contains("noise_reduction_strength"));
    assert!(content.contains("[toolchain]"));
}

#[test]
fn config_file_is_honoured() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("voice.wav");
    let config = dir.path().join("config.toml");
    write_tone(&input, 16000, 0.3);
    fs::write(
        &config,
        "[pipeline]\ntarget_sample_rate = 8000\n\n[batch]\noutput_format = \"wav\"\noutput_suffix = \"_clean\"\npreserve_names = false\n",
    )
    .unwrap();

    studioclean()
        .arg(&input)
        .arg("-c")
        .arg(&config)
        .arg("-o")
        .arg(dir.path().join("out"))
        .assert()
        .success();

    let reader = hound::WavReader::open(dir.path().join("out").join("001_clean.wav")).unwrap();
    assert_eq!(reader.spec().sample_rate, 8000);
}

#[test]
fn check_reports_missing_ffmpeg() {
    studioclean()
        .args(["--check", "--ffmpeg", "/nonexistent/ffmpeg"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("NOT available"))
        .stdout(predicate::str::contains("recommended"));
}

#[test]
fn archive_zips_outputs() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("take.wav");
    let output = dir.path().join("out");
    write_tone(&input, 16000, 0.3);

    studioclean()
        .arg(&input)
        .args(["-f", "wav", "--archive", "-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Archive:"));

    let archive = fs::read_dir(&output)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|e| e == "zip"))
        .unwrap();
    let name = archive.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("enhanced_audios_"));

    let mut zip = zip::ZipArchive::new(fs::File::open(&archive).unwrap()).unwrap();
    let mut entry = zip.by_name("take_studio.wav").unwrap();
    let mut archived = Vec::new();
    entry.read_to_end(&mut archived).unwrap();
    drop(entry);
    assert_eq!(archived, fs::read(output.join("take_studio.wav")).unwrap());
    assert!(zip.by_name("manifest.toml").is_ok());
}
