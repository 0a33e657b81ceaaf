//! End-to-end chapter embedding pipeline.
//!
//! Synchronous, single file at a time: parse labels, probe the duration,
//! resolve intervals, then per output format transcode (optionally
//! normalizing loudness in the same pass) and embed the chapter payload.
//! Every write lands in a temporary sibling first; a failed export never
//! leaves a partial output in place.

use crate::chapter::{self, ResolvedChapter};
use crate::encoder::{ChapterEncoder, FfmetaChapterEncoder, Id3ChapterEncoder, NeroChapterEncoder};
use crate::error::{ChapterError, ChapterResult};
use crate::label;
use crate::loudness::ffmpeg::loudnorm_spec;
use crate::loudness::{self, LoudnessFilter, LoudnessTargets, NormalizationMode};
use crate::probe::DurationProber;
use crate::tag;
use crate::transcode::{OutputFormat, Transcoder};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Output directory; defaults to the input file's directory
    pub output_dir: Option<PathBuf>,
    /// Formats to export, in order
    pub formats: Vec<OutputFormat>,
    /// Whether to loudness-normalize during transcoding
    pub normalize: bool,
    /// Normalization targets
    pub targets: LoudnessTargets,
    /// Also write a Nero chapter XML sidecar next to each M4A output
    pub nero_sidecar: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            output_dir: None,
            formats: vec![OutputFormat::M4a, OutputFormat::Mp3],
            normalize: false,
            targets: LoudnessTargets::default(),
            nero_sidecar: false,
        }
    }
}

/// Summary of a completed pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// Number of resolved chapters embedded in every output
    pub chapter_count: usize,
    /// Files written, in export order
    pub outputs: Vec<PathBuf>,
    /// How (or whether) loudness was corrected
    pub normalization: NormalizationMode,
}

/// The chapter embedding pipeline, wired to its external collaborators.
pub struct ChapterPipeline<'a> {
    prober: &'a dyn DurationProber,
    loudness: &'a dyn LoudnessFilter,
    transcoder: &'a dyn Transcoder,
}

struct ExportJob<'a> {
    audio: &'a Path,
    dir: &'a Path,
    stem: &'a str,
    format: OutputFormat,
    filter_spec: Option<&'a str>,
    nero_sidecar: bool,
}

impl<'a> ChapterPipeline<'a> {
    /// Create a pipeline from its collaborator ports
    pub fn new(
        prober: &'a dyn DurationProber,
        loudness: &'a dyn LoudnessFilter,
        transcoder: &'a dyn Transcoder,
    ) -> Self {
        ChapterPipeline {
            prober,
            loudness,
            transcoder,
        }
    }

    /// Run the full pipeline for one audio file and its label file.
    pub fn run(
        &self,
        audio_file: &Path,
        label_file: &Path,
        options: &PipelineOptions,
    ) -> ChapterResult<PipelineReport> {
        if !audio_file.is_file() {
            return Err(ChapterError::InputNotFound(audio_file.to_path_buf()));
        }
        if options.formats.is_empty() {
            return Err(ChapterError::Config("no output formats selected".to_string()));
        }

        let events = label::parse_label_file(label_file)?;
        let total_duration_ms = self.prober.probe_duration_ms(audio_file)?;
        let chapters = chapter::resolve(events, total_duration_ms)?;
        info!(
            "resolved {} chapters over {} ms",
            chapters.len(),
            total_duration_ms
        );

        let plan = loudness::plan(self.loudness, audio_file, &options.targets, options.normalize);
        let filter_spec = plan
            .is_active()
            .then(|| loudnorm_spec(&options.targets, plan.measurement()));

        let dir = match &options.output_dir {
            Some(dir) => dir.clone(),
            None => audio_file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        fs::create_dir_all(&dir)?;

        let stem = audio_file
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ChapterError::Config(format!(
                    "cannot derive an output name from {:?}",
                    audio_file
                ))
            })?;

        let mut outputs = Vec::new();
        for format in &options.formats {
            let job = ExportJob {
                audio: audio_file,
                dir: &dir,
                stem,
                format: *format,
                filter_spec: filter_spec.as_deref(),
                nero_sidecar: options.nero_sidecar,
            };
            let written = self.export(&job, &chapters)?;
            info!(
                "wrote {} with {} embedded chapters",
                written[0].display(),
                chapters.len()
            );
            outputs.extend(written);
        }

        Ok(PipelineReport {
            chapter_count: chapters.len(),
            outputs,
            normalization: plan.mode(),
        })
    }

    /// Export one format, cleaning up temporaries on failure.
    fn export(&self, job: &ExportJob<'_>, chapters: &[ResolvedChapter]) -> ChapterResult<Vec<PathBuf>> {
        let mut temps = Vec::new();
        let result = self.export_inner(job, chapters, &mut temps);
        if result.is_err() {
            for temp in &temps {
                let _ = fs::remove_file(temp);
            }
        }
        result
    }

    fn export_inner(
        &self,
        job: &ExportJob<'_>,
        chapters: &[ResolvedChapter],
        temps: &mut Vec<PathBuf>,
    ) -> ChapterResult<Vec<PathBuf>> {
        let extension = job.format.extension();
        let final_path = job
            .dir
            .join(format!("{}_chapters.{extension}", job.stem));
        let transcoded = job
            .dir
            .join(format!("{}_chapters.pass1.{extension}", job.stem));
        temps.push(transcoded.clone());

        self.transcoder
            .transcode(job.audio, &transcoded, job.format, job.filter_spec)?;

        let mut outputs = vec![final_path.clone()];
        match job.format {
            OutputFormat::Mp3 => {
                let payload = Id3ChapterEncoder.encode(chapters)?;
                tag::replace_id3_chapters(&transcoded, &payload)?;
                fs::rename(&transcoded, &final_path)?;
            }
            OutputFormat::M4a => {
                let payload = FfmetaChapterEncoder.encode(chapters)?;
                let meta = job.dir.join(format!("{}_chapters.ffmeta", job.stem));
                temps.push(meta.clone());
                fs::write(&meta, &payload)?;

                let merged = job
                    .dir
                    .join(format!("{}_chapters.pass2.{extension}", job.stem));
                temps.push(merged.clone());
                self.transcoder.merge_metadata(&transcoded, &meta, &merged)?;

                fs::rename(&merged, &final_path)?;
                let _ = fs::remove_file(&transcoded);
                let _ = fs::remove_file(&meta);

                if job.nero_sidecar {
                    let sidecar = job.dir.join(format!("{}_chapters.xml", job.stem));
                    fs::write(&sidecar, NeroChapterEncoder.encode(chapters)?)?;
                    outputs.push(sidecar);
                }
            }
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loudness::LoudnessMeasurement;
    use std::sync::Mutex;

    struct FixedProber(u64);

    impl DurationProber for FixedProber {
        fn probe_duration_ms(&self, _path: &Path) -> ChapterResult<u64> {
            Ok(self.0)
        }
    }

    struct FixedFilter(Option<LoudnessMeasurement>);

    impl LoudnessFilter for FixedFilter {
        fn measure(
            &self,
            _input: &Path,
            _targets: &LoudnessTargets,
        ) -> ChapterResult<LoudnessMeasurement> {
            self.0.ok_or_else(|| ChapterError::ExternalTool {
                tool: "mock".to_string(),
                message: "measurement unavailable".to_string(),
            })
        }
    }

    /// Writes fake outputs and records the audio filters it was given.
    #[derive(Default)]
    struct RecordingTranscoder {
        filters: Mutex<Vec<Option<String>>>,
        metadata_payloads: Mutex<Vec<Vec<u8>>>,
    }

    impl Transcoder for RecordingTranscoder {
        fn transcode(
            &self,
            _input: &Path,
            output: &Path,
            _format: OutputFormat,
            audio_filter: Option<&str>,
        ) -> ChapterResult<()> {
            self.filters
                .lock()
                .unwrap()
                .push(audio_filter.map(str::to_string));
            fs::write(output, b"\xff\xfbFAKEAUDIO")?;
            Ok(())
        }

        fn merge_metadata(
            &self,
            audio: &Path,
            metadata: &Path,
            output: &Path,
        ) -> ChapterResult<()> {
            self.metadata_payloads
                .lock()
                .unwrap()
                .push(fs::read(metadata)?);
            fs::copy(audio, output)?;
            Ok(())
        }
    }

    fn measurement() -> LoudnessMeasurement {
        LoudnessMeasurement {
            integrated_lufs: -23.0,
            true_peak_dbtp: -5.0,
            loudness_range_lu: 6.0,
            threshold_lufs: -33.0,
        }
    }

    fn setup(dir: &Path) -> (PathBuf, PathBuf) {
        let audio = dir.join("book.wav");
        fs::write(&audio, b"fake input").unwrap();
        let labels = dir.join("book_labels.txt");
        fs::write(&labels, "0.0\t0.0\tIntro\n10.5\t10.5\tChapter Two\n").unwrap();
        (audio, labels)
    }

    #[test]
    fn test_mp3_export_embeds_chapters() {
        let tmp = tempfile::tempdir().unwrap();
        let (audio, labels) = setup(tmp.path());
        let prober = FixedProber(20_000);
        let filter = FixedFilter(None);
        let transcoder = RecordingTranscoder::default();
        let pipeline = ChapterPipeline::new(&prober, &filter, &transcoder);

        let options = PipelineOptions {
            formats: vec![OutputFormat::Mp3],
            ..PipelineOptions::default()
        };
        let report = pipeline.run(&audio, &labels, &options).unwrap();

        assert_eq!(report.chapter_count, 2);
        assert_eq!(report.normalization, NormalizationMode::Skipped);
        let out = tmp.path().join("book_chapters.mp3");
        assert_eq!(report.outputs, vec![out.clone()]);
        // The embedded tag starts the file
        let data = fs::read(&out).unwrap();
        assert!(data.starts_with(b"ID3"));
        assert!(data.ends_with(b"FAKEAUDIO"));
    }

    #[test]
    fn test_m4a_export_merges_ffmetadata() {
        let tmp = tempfile::tempdir().unwrap();
        let (audio, labels) = setup(tmp.path());
        let prober = FixedProber(20_000);
        let filter = FixedFilter(None);
        let transcoder = RecordingTranscoder::default();
        let pipeline = ChapterPipeline::new(&prober, &filter, &transcoder);

        let options = PipelineOptions {
            formats: vec![OutputFormat::M4a],
            ..PipelineOptions::default()
        };
        let report = pipeline.run(&audio, &labels, &options).unwrap();

        assert!(tmp.path().join("book_chapters.m4a").is_file());
        assert_eq!(report.chapter_count, 2);

        let payloads = transcoder.metadata_payloads.lock().unwrap();
        let text = String::from_utf8(payloads[0].clone()).unwrap();
        assert!(text.starts_with(";FFMETADATA1\n"));
        assert!(text.contains("START=10500"));

        // No temporaries left behind
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains("pass") || name.ends_with(".ffmeta"))
            .collect();
        assert!(leftovers.is_empty(), "leftovers: {leftovers:?}");
    }

    #[test]
    fn test_nero_sidecar_is_written_on_request() {
        let tmp = tempfile::tempdir().unwrap();
        let (audio, labels) = setup(tmp.path());
        let prober = FixedProber(20_000);
        let filter = FixedFilter(None);
        let transcoder = RecordingTranscoder::default();
        let pipeline = ChapterPipeline::new(&prober, &filter, &transcoder);

        let options = PipelineOptions {
            formats: vec![OutputFormat::M4a],
            nero_sidecar: true,
            ..PipelineOptions::default()
        };
        let report = pipeline.run(&audio, &labels, &options).unwrap();

        let sidecar = tmp.path().join("book_chapters.xml");
        assert!(report.outputs.contains(&sidecar));
        let text = fs::read_to_string(&sidecar).unwrap();
        assert!(text.contains("starttime=\"00:00:10.500\""));
    }

    #[test]
    fn test_successful_measure_means_linear_apply() {
        let tmp = tempfile::tempdir().unwrap();
        let (audio, labels) = setup(tmp.path());
        let prober = FixedProber(20_000);
        let filter = FixedFilter(Some(measurement()));
        let transcoder = RecordingTranscoder::default();
        let pipeline = ChapterPipeline::new(&prober, &filter, &transcoder);

        let options = PipelineOptions {
            formats: vec![OutputFormat::Mp3],
            normalize: true,
            ..PipelineOptions::default()
        };
        let report = pipeline.run(&audio, &labels, &options).unwrap();

        assert_eq!(report.normalization, NormalizationMode::Linear);
        let filters = transcoder.filters.lock().unwrap();
        let spec = filters[0].as_deref().unwrap();
        assert!(spec.contains("measured_I=-23"));
        assert!(spec.contains("linear=true"));
    }

    #[test]
    fn test_failed_measure_falls_back_to_dynamic() {
        let tmp = tempfile::tempdir().unwrap();
        let (audio, labels) = setup(tmp.path());
        let prober = FixedProber(20_000);
        let filter = FixedFilter(None);
        let transcoder = RecordingTranscoder::default();
        let pipeline = ChapterPipeline::new(&prober, &filter, &transcoder);

        let options = PipelineOptions {
            formats: vec![OutputFormat::Mp3],
            normalize: true,
            ..PipelineOptions::default()
        };
        let report = pipeline.run(&audio, &labels, &options).unwrap();

        // Output still produced, with a plain dynamic loudnorm filter
        assert_eq!(report.normalization, NormalizationMode::Dynamic);
        assert!(tmp.path().join("book_chapters.mp3").is_file());
        let filters = transcoder.filters.lock().unwrap();
        let spec = filters[0].as_deref().unwrap();
        assert!(spec.starts_with("loudnorm=I="));
        assert!(!spec.contains("measured_I"));
    }

    #[test]
    fn test_missing_audio_file() {
        let tmp = tempfile::tempdir().unwrap();
        let labels = tmp.path().join("labels.txt");
        fs::write(&labels, "0.0\t0.0\tIntro\n").unwrap();
        let prober = FixedProber(20_000);
        let filter = FixedFilter(None);
        let transcoder = RecordingTranscoder::default();
        let pipeline = ChapterPipeline::new(&prober, &filter, &transcoder);

        let result = pipeline.run(
            &tmp.path().join("missing.wav"),
            &labels,
            &PipelineOptions::default(),
        );
        assert!(matches!(result, Err(ChapterError::InputNotFound(_))));
    }

    #[test]
    fn test_empty_format_list_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (audio, labels) = setup(tmp.path());
        let prober = FixedProber(20_000);
        let filter = FixedFilter(None);
        let transcoder = RecordingTranscoder::default();
        let pipeline = ChapterPipeline::new(&prober, &filter, &transcoder);

        let options = PipelineOptions {
            formats: Vec::new(),
            ..PipelineOptions::default()
        };
        let result = pipeline.run(&audio, &labels, &options);
        assert!(matches!(result, Err(ChapterError::Config(_))));
    }

    #[test]
    fn test_output_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let (audio, labels) = setup(tmp.path());
        let prober = FixedProber(20_000);
        let filter = FixedFilter(None);
        let transcoder = RecordingTranscoder::default();
        let pipeline = ChapterPipeline::new(&prober, &filter, &transcoder);

        let out_dir = tmp.path().join("exports").join("book");
        let options = PipelineOptions {
            formats: vec![OutputFormat::Mp3],
            output_dir: Some(out_dir.clone()),
            ..PipelineOptions::default()
        };
        pipeline.run(&audio, &labels, &options).unwrap();

        assert!(out_dir.join("book_chapters.mp3").is_file());
    }
}
