//! RunSynthesisJob Handler - 执行一个合成任务
//!
//! 准备参考音频与参考文本后交给编排器；同一参考源在一次任务内只准备一次

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::pipeline::{
    report_failure, ReferencePreparer, ReferenceVoice, SynthesisOrchestrator, OUTPUT_SAMPLE_RATE,
};
use crate::application::ports::{JobOutput, JobRequest, ProgressSink, SegmentSpec, SpeakerSpec};
use crate::domain::{Segment, Tensor};

pub struct RunSynthesisJobHandler {
    orchestrator: SynthesisOrchestrator,
    preparer: ReferencePreparer,
}

impl RunSynthesisJobHandler {
    pub fn new(orchestrator: SynthesisOrchestrator, preparer: ReferencePreparer) -> Self {
        Self {
            orchestrator,
            preparer,
        }
    }

    /// 执行任务，失败时 sink 已收到终止进度
    pub async fn handle(
        &self,
        request: JobRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<JobOutput, ApplicationError> {
        let samples = match request {
            JobRequest::Batch { segments, settings } => {
                let segments = self
                    .prepare_segments(&segments, &sink)
                    .await
                    .inspect_err(|err| report_failure(sink.as_ref(), err))?;
                let outputs = self.orchestrator.run_batch(segments, &settings, sink).await?;
                outputs.concat()
            }
            JobRequest::Podcast {
                script,
                speakers,
                settings,
            } => {
                let voices = self
                    .prepare_speakers(&speakers, &sink)
                    .await
                    .inspect_err(|err| report_failure(sink.as_ref(), err))?;
                self.orchestrator
                    .run_podcast(&script, &voices, &settings, sink)
                    .await?
            }
        };

        Ok(JobOutput {
            samples: Arc::new(samples),
            sample_rate: OUTPUT_SAMPLE_RATE,
        })
    }

    async fn prepare_segments(
        &self,
        specs: &[SegmentSpec],
        sink: &Arc<dyn ProgressSink>,
    ) -> Result<Vec<Segment>, ApplicationError> {
        // (url, 给定文本) → 已准备好的参考
        let mut prepared: HashMap<(String, Option<String>), ReferenceVoice> = HashMap::new();
        let mut segments = Vec::with_capacity(specs.len());

        for spec in specs {
            let key = (spec.ref_audio_url.clone(), spec.ref_text.clone());
            let voice = match prepared.get(&key) {
                Some(voice) => voice.clone(),
                None => {
                    let voice = self
                        .prepare_voice(&spec.ref_audio_url, spec.ref_text.as_deref(), sink)
                        .await?;
                    prepared.insert(key, voice.clone());
                    voice
                }
            };
            segments.push(Segment::new(voice.audio, voice.text, spec.gen_text.clone()));
        }

        Ok(segments)
    }

    async fn prepare_speakers(
        &self,
        speakers: &BTreeMap<String, SpeakerSpec>,
        sink: &Arc<dyn ProgressSink>,
    ) -> Result<BTreeMap<String, ReferenceVoice>, ApplicationError> {
        let mut voices = BTreeMap::new();
        for (name, spec) in speakers {
            // 名字仍参与脚本解析，台词在编排时被跳过
            if spec.ref_audio_url.trim().is_empty() {
                tracing::warn!(speaker = %name, "Speaker has no reference audio");
                voices.insert(
                    name.clone(),
                    ReferenceVoice {
                        audio: Tensor::waveform(Vec::new()),
                        text: String::new(),
                    },
                );
                continue;
            }
            let voice = self
                .prepare_voice(&spec.ref_audio_url, spec.ref_text.as_deref(), sink)
                .await?;
            voices.insert(name.clone(), voice);
        }
        Ok(voices)
    }

    async fn prepare_voice(
        &self,
        source: &str,
        ref_text: Option<&str>,
        sink: &Arc<dyn ProgressSink>,
    ) -> Result<ReferenceVoice, ApplicationError> {
        let audio: Tensor = self.preparer.load_audio(source).await?;
        let text = self.preparer.resolve_text(&audio, ref_text, sink).await?;
        tracing::debug!(source = %source, samples = audio.numel(), "Reference voice ready");
        Ok(ReferenceVoice { audio, text })
    }
}
