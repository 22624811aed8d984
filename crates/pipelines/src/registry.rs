// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The task registry: what each task needs and how it runs by default.
//!
//! [`TaskRegistry::builtin`] builds the table once; it is then passed by
//! reference and never mutated.
//!
//! | Task | Kind | Modality | Default config |
//! |---|---|---|---|
//! | audio-classification | classification | audio | `hubert-base` |
//! | automatic-speech-recognition | CTC | multimodal | `wav2vec2-ctc-base` |
//! | fill-mask | fill-mask | text | `distilroberta-base` |
//! | image-classification | classification | image | `vit-base` |
//! | question-answering | QA | text | `distilbert-base` |
//! | text-classification | classification | text | `distilbert-base` |
//! | token-classification | tagging | text | `bert-large` |
//! | text-generation | generation | text | 1 device |
//! | summarization, translation, text2text-generation | seq2seq generation | text | 2 devices |
//! | zero-shot-classification | zero-shot | text | `roberta-large` |

use std::collections::BTreeMap;
use std::fmt;

use model_hub::ModelClass;

use crate::{DeviceConfig, DeviceConfigArg, PipelineError, Truncation};

/// Sequence length questions and contexts are padded to.
pub const QA_MAX_SEQ_LEN: usize = 384;

/// Kind of data a task consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Text,
    Audio,
    Image,
    Multimodal,
}

impl Modality {
    pub fn requires_tokenizer(self) -> bool {
        matches!(self, Modality::Text | Modality::Multimodal)
    }

    pub fn requires_feature_extractor(self) -> bool {
        matches!(self, Modality::Audio | Modality::Image | Modality::Multimodal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Audio => "audio",
            Modality::Image => "image",
            Modality::Multimodal => "multimodal",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a task generates sequences, and with which architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationKind {
    None,
    DecoderOnly,
    Seq2Seq,
}

impl GenerationKind {
    pub fn is_generation(self) -> bool {
        self != GenerationKind::None
    }
}

/// The pipeline implementation a task uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    AudioClassification,
    SpeechRecognition,
    FillMask,
    ImageClassification,
    QuestionAnswering,
    TextClassification,
    TokenClassification,
    TextGeneration,
    Summarization,
    Translation,
    Text2TextGeneration,
    ZeroShotClassification,
}

impl PipelineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineKind::AudioClassification => "audio-classification",
            PipelineKind::SpeechRecognition => "speech-recognition",
            PipelineKind::FillMask => "fill-mask",
            PipelineKind::ImageClassification => "image-classification",
            PipelineKind::QuestionAnswering => "question-answering",
            PipelineKind::TextClassification => "text-classification",
            PipelineKind::TokenClassification => "token-classification",
            PipelineKind::TextGeneration => "text-generation",
            PipelineKind::Summarization => "summarization",
            PipelineKind::Translation => "translation",
            PipelineKind::Text2TextGeneration => "text2text-generation",
            PipelineKind::ZeroShotClassification => "zero-shot-classification",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the factory needs to know about one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub name: String,
    pub kind: PipelineKind,
    /// Model heads the task accepts.
    pub model_classes: Vec<ModelClass>,
    pub modality: Modality,
    pub default_config: DeviceConfigArg,
    pub default_model: String,
    pub default_revision: String,
    pub max_length: Option<usize>,
    pub max_input_length: Option<usize>,
    pub truncation: Option<Truncation>,
    pub generation: GenerationKind,
}

impl TaskDescriptor {
    pub fn is_generation(&self) -> bool {
        self.generation.is_generation()
    }

    pub fn is_seq2seq_generation(&self) -> bool {
        self.generation == GenerationKind::Seq2Seq
    }

    pub fn supports(&self, class: ModelClass) -> bool {
        self.model_classes.contains(&class)
    }

    /// Returns a one-line description.
    pub fn summary(&self) -> String {
        let classes: Vec<&str> = self.model_classes.iter().map(|c| c.as_str()).collect();
        let mut s = format!(
            "{} [{}]: {} model {}@{}, classes [{}], device config {}",
            self.name,
            self.modality,
            self.kind,
            self.default_model,
            self.default_revision,
            classes.join(", "),
            self.default_config,
        );
        if let Some(n) = self.max_length {
            s.push_str(&format!(", max_length {n}"));
        }
        if let Some(n) = self.max_input_length {
            s.push_str(&format!(", max_input_length {n}"));
        }
        if let Some(t) = self.truncation {
            s.push_str(&format!(", truncation {t}"));
        }
        s
    }
}

/// A task name after alias and translation-pair resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTask<'r> {
    /// The name as requested, with aliases replaced
    /// (`translation_en_to_fr` stays as is).
    pub task: String,
    pub descriptor: &'r TaskDescriptor,
    /// `(source, target)` languages of a `translation_xx_to_yy` task.
    pub languages: Option<(String, String)>,
}

/// Immutable task table.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, TaskDescriptor>,
    aliases: BTreeMap<String, String>,
}

impl TaskRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, descriptor: TaskDescriptor) -> Self {
        self.tasks.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, task: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), task.into());
        self
    }

    /// The standard task table.
    pub fn builtin() -> Self {
        use GenerationKind::{DecoderOnly, Seq2Seq};
        use Modality::{Audio, Image, Multimodal, Text};

        let seq2seq = |name: &str,
                       kind: PipelineKind,
                       max_length: usize,
                       max_input_length: usize| TaskDescriptor {
            name: name.into(),
            kind,
            model_classes: vec![ModelClass::Seq2SeqLm],
            modality: Text,
            default_config: DeviceConfig::with_devices(2).into(),
            default_model: String::new(),
            default_revision: String::new(),
            max_length: Some(max_length),
            max_input_length: Some(max_input_length),
            truncation: Some(Truncation::OnlyFirst),
            generation: Seq2Seq,
        };

        Self::new()
            .with_task(task(
                "audio-classification",
                PipelineKind::AudioClassification,
                &[ModelClass::AudioClassification],
                Audio,
                "hubert-base",
                ("superb/hubert-base-superb-ks", "d7e0efe"),
                None,
            ))
            .with_task(task(
                "automatic-speech-recognition",
                PipelineKind::SpeechRecognition,
                &[ModelClass::Ctc],
                Multimodal,
                "wav2vec2-ctc-base",
                ("facebook/wav2vec2-base-960h", "55bb623"),
                None,
            ))
            .with_task(task(
                "fill-mask",
                PipelineKind::FillMask,
                &[ModelClass::MaskedLm],
                Text,
                "distilroberta-base",
                ("distilroberta-base", "ec58a5b"),
                Some(128),
            ))
            .with_task(task(
                "image-classification",
                PipelineKind::ImageClassification,
                &[ModelClass::ImageClassification],
                Image,
                "vit-base",
                ("google/vit-base-patch16-224", "5dca96d"),
                None,
            ))
            .with_task(task(
                "question-answering",
                PipelineKind::QuestionAnswering,
                &[ModelClass::QuestionAnswering],
                Text,
                "distilbert-base",
                ("distilbert-base-cased-distilled-squad", "626af31"),
                None,
            ))
            .with_task(task(
                "text-classification",
                PipelineKind::TextClassification,
                &[ModelClass::SequenceClassification],
                Text,
                "distilbert-base",
                ("distilbert-base-uncased-finetuned-sst-2-english", "af0f99b"),
                Some(128),
            ))
            .with_task(task(
                "token-classification",
                PipelineKind::TokenClassification,
                &[ModelClass::TokenClassification],
                Text,
                "bert-large",
                ("dbmdz/bert-large-cased-finetuned-conll03-english", "f2482bf"),
                Some(128),
            ))
            .with_task(TaskDescriptor {
                name: "text-generation".into(),
                kind: PipelineKind::TextGeneration,
                model_classes: vec![ModelClass::CausalLm],
                modality: Text,
                default_config: DeviceConfig::default().into(),
                default_model: "gpt2".into(),
                default_revision: "e7da7f2".into(),
                max_length: Some(50),
                max_input_length: None,
                truncation: None,
                generation: DecoderOnly,
            })
            .with_task(TaskDescriptor {
                default_model: "ainize/bart-base-cnn".into(),
                default_revision: "b90bc9a".into(),
                ..seq2seq("summarization", PipelineKind::Summarization, 20, 50)
            })
            .with_task(TaskDescriptor {
                default_model: "t5-small".into(),
                default_revision: "9507060".into(),
                ..seq2seq("translation", PipelineKind::Translation, 50, 45)
            })
            .with_task(TaskDescriptor {
                default_model: "t5-small".into(),
                default_revision: "9507060".into(),
                ..seq2seq("text2text-generation", PipelineKind::Text2TextGeneration, 50, 50)
            })
            .with_task(task(
                "zero-shot-classification",
                PipelineKind::ZeroShotClassification,
                &[ModelClass::SequenceClassification],
                Text,
                "roberta-large",
                ("roberta-large-mnli", "130fb28"),
                Some(128),
            ))
            .with_alias("sentiment-analysis", "text-classification")
            .with_alias("ner", "token-classification")
    }

    /// Looks up a canonical task name.
    pub fn descriptor_for(&self, task: &str) -> Result<&TaskDescriptor, PipelineError> {
        self.tasks.get(task).ok_or_else(|| self.unsupported(task))
    }

    /// Resolves aliases and `translation_xx_to_yy`, then looks the task up.
    pub fn resolve(&self, task: &str) -> Result<ResolvedTask<'_>, PipelineError> {
        let task = self.aliases.get(task).map(String::as_str).unwrap_or(task);
        let (target, languages) = if task.starts_with("translation") {
            ("translation", parse_translation_pair(task))
        } else {
            (task, None)
        };
        Ok(ResolvedTask {
            task: task.to_string(),
            descriptor: self.descriptor_for(target)?,
            languages,
        })
    }

    /// Canonical task names and aliases, sorted.
    pub fn list_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .keys()
            .chain(self.aliases.keys())
            .cloned()
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Alias to canonical task.
    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.values()
    }

    fn unsupported(&self, task: &str) -> PipelineError {
        PipelineError::UnsupportedTask {
            task: task.to_string(),
            supported: self.tasks.keys().cloned().collect(),
            aliases: self
                .aliases
                .iter()
                .map(|(a, t)| (a.clone(), t.clone()))
                .collect(),
        }
    }
}

fn task(
    name: &str,
    kind: PipelineKind,
    classes: &[ModelClass],
    modality: Modality,
    preset: &str,
    (model, revision): (&str, &str),
    max_length: Option<usize>,
) -> TaskDescriptor {
    TaskDescriptor {
        name: name.into(),
        kind,
        model_classes: classes.to_vec(),
        modality,
        default_config: DeviceConfigArg::Preset(preset.into()),
        default_model: model.into(),
        default_revision: revision.into(),
        max_length,
        max_input_length: None,
        truncation: None,
        generation: GenerationKind::None,
    }
}

/// `translation_en_to_fr` → `("en", "fr")`.
fn parse_translation_pair(task: &str) -> Option<(String, String)> {
    let pair = task.strip_prefix("translation_")?;
    let (src, tgt) = pair.split_once("_to_")?;
    (!src.is_empty() && !tgt.is_empty()).then(|| (src.to_string(), tgt.to_string()))
}
