//! joycaption-beta-one-GGUF
//!
//! llama.cpp + mtmd 推理
//! 引用: https://github.com/judian17/ComfyUI-joycaption-beta-one-GGUF

use std::{ffi::CString, fmt::Display, num::NonZeroU32, path::Path, time::Duration};

use image::RgbImage;
use llama_cpp_2::{
    context::{params::LlamaContextParams, LlamaContext},
    ggml_time_us,
    llama_backend::LlamaBackend,
    llama_batch::LlamaBatch,
    model::{params::LlamaModelParams, AddBos, LlamaChatMessage, LlamaModel, Special},
    mtmd::{mtmd_default_marker, MtmdBitmap, MtmdContext, MtmdContextParams, MtmdInputText},
    sampling::LlamaSampler,
    send_logs_to_tracing,
    token::LlamaToken,
    LlamaCppError, LogOptions,
};
use log::{debug, info, warn};

use crate::{
    config::ModelConfig,
    error::Error,
    image::encode_png,
    joycaption::prompter::{render_llama3, ChatMessage, Role},
    model::{Captioner, GeneratedTokens, GenerationParams, SamplerStage},
};

fn generation_err(e: impl Display) -> Error {
    Error::Generation(e.to_string())
}

fn load_err(e: impl Display) -> Error {
    Error::ModelLoad(e.to_string())
}

/// JoyCaption GGUF 模型
///
/// 字段按释放顺序排列: mtmd 上下文先于模型释放
pub struct JoyCaptionGGUF {
    mtmd_context: MtmdContext,
    model: LlamaModel,
    backend: LlamaBackend,
    config: ModelConfig,
    media_marker: String,
}

impl JoyCaptionGGUF {
    /// 加载模型与 mmproj
    pub fn new(config: &ModelConfig) -> Result<Self, Error> {
        let (model_path, mmproj_path) = config.resolve()?;

        send_logs_to_tracing(LogOptions::default().with_logs_enabled(config.verbose));

        let backend = Self::init_backend()?;

        info!("loading model: {}", model_path.display());
        let model_params = LlamaModelParams::default().with_n_gpu_layers(config.n_gpu_layers);
        let model =
            LlamaModel::load_from_file(&backend, &model_path, &model_params).map_err(load_err)?;

        let media_marker = config
            .media_marker
            .clone()
            .unwrap_or_else(|| mtmd_default_marker().to_string());
        let mtmd_params = MtmdContextParams {
            use_gpu: config.n_gpu_layers > 0,
            print_timings: config.verbose,
            n_threads: config.n_threads(),
            media_marker: CString::new(media_marker.clone())
                .map_err(|e| Error::InvalidParameter(format!("media_marker, {e}")))?,
        };

        info!("loading mmproj: {}", mmproj_path.display());
        let mmproj_path = Self::path_str(&mmproj_path)?;
        let mtmd_context =
            MtmdContext::init_from_file(&mmproj_path, &model, &mtmd_params).map_err(load_err)?;

        Ok(Self {
            mtmd_context,
            model,
            backend,
            config: config.clone(),
            media_marker,
        })
    }

    fn init_backend() -> Result<LlamaBackend, Error> {
        match LlamaBackend::init() {
            Ok(backend) => Ok(backend),
            Err(LlamaCppError::BackendAlreadyInitialized) => Ok(LlamaBackend {}),
            Err(e) => Err(load_err(e)),
        }
    }

    fn path_str(path: &Path) -> Result<String, Error> {
        path.to_str()
            .map(|v| v.to_string())
            .ok_or_else(|| Error::InvalidParameter(format!("non UTF-8 path: {}", path.display())))
    }

    /// 每次生成使用新的上下文, KV cache 不在图片之间共享
    fn new_context(&self) -> Result<LlamaContext<'_>, Error> {
        let n_threads = self.config.n_threads();
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.config.n_ctx))
            .with_n_batch(self.config.n_batch)
            .with_n_threads(n_threads)
            .with_n_threads_batch(n_threads);

        self.model
            .new_context(&self.backend, ctx_params)
            .map_err(generation_err)
    }

    /// 采样器
    fn load_sampler(params: &GenerationParams) -> LlamaSampler {
        let samplers = params.sampler_stages().into_iter().map(|stage| match stage {
            SamplerStage::Greedy => LlamaSampler::greedy(),
            SamplerStage::TopK(k) => LlamaSampler::top_k(k as i32),
            SamplerStage::Temperature(t) => LlamaSampler::temp(t),
            SamplerStage::TopP(p) => LlamaSampler::top_p(p, 1),
            SamplerStage::Dist(seed) => LlamaSampler::dist(seed),
        });

        LlamaSampler::chain_simple(samplers)
    }
}

impl Captioner for JoyCaptionGGUF {
    /// 使用模型自带的对话模板, 缺失时使用 Llama 3 格式
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<String, Error> {
        let template = match self.model.chat_template(None) {
            Ok(v) => v,
            Err(e) => {
                warn!("model has no chat template, fall back to llama3, {e}");
                return Ok(render_llama3(messages, Some(&self.media_marker)));
            }
        };

        let mut marker = Some(self.media_marker.as_str());
        let mut chat = Vec::with_capacity(messages.len());
        for message in messages {
            let content = match (message.role, marker) {
                (Role::User, Some(m)) => {
                    marker = None;
                    format!("{m}\n{}", message.content.trim())
                }
                _ => message.content.trim().to_string(),
            };
            let message =
                LlamaChatMessage::new(message.role.to_string(), content).map_err(generation_err)?;
            chat.push(message);
        }

        self.model
            .apply_chat_template(&template, &chat, true)
            .map_err(generation_err)
    }

    fn generate(
        &mut self,
        rendered: &str,
        image: &RgbImage,
        params: &GenerationParams,
    ) -> Result<GeneratedTokens, Error> {
        params.validate()?;
        if params.suppress_tokens.is_some() {
            warn!("suppress_tokens is not supported by the llama.cpp backend, ignored");
        }

        let png = encode_png(image).map_err(generation_err)?;
        let bitmap = MtmdBitmap::from_buffer(&self.mtmd_context, &png).map_err(generation_err)?;

        let mut ctx = self.new_context()?;

        let input_text = MtmdInputText {
            text: rendered.to_string(),
            add_special: true,
            parse_special: true,
        };
        let chunks = self
            .mtmd_context
            .tokenize(input_text, &[&bitmap])
            .map_err(generation_err)?;
        debug!("tokenization complete, {} chunks created", chunks.len());

        let n_batch = self.config.n_batch as i32;
        let n_past = chunks
            .eval_chunks(&self.mtmd_context, &ctx, 0, 0, n_batch, true)
            .map_err(generation_err)?;

        let prompt_tokens = self
            .model
            .str_to_token(rendered, AddBos::Never)
            .map_err(generation_err)?;
        let mut sequence: Vec<u32> = prompt_tokens.iter().map(|t| t.0 as u32).collect();
        let prompt_len = sequence.len();

        let n_ctx = ctx.n_ctx() as i32;
        let budget = (n_ctx - n_past).max(0) as usize;
        let max_tokens = params.max_new_tokens.min(budget);
        if max_tokens < params.max_new_tokens {
            warn!(
                "context too small, n_ctx = {n_ctx}, n_past = {n_past}, generate at most {max_tokens} tokens"
            );
        }

        let mut sampler = Self::load_sampler(params);
        let mut batch = LlamaBatch::new(self.config.n_batch as usize, 1);
        let mut n_cur = n_past;
        let mut n_decode = 0;

        let t_main_start = ggml_time_us();
        while n_decode < max_tokens {
            let token = sampler.sample(&ctx, -1);
            sampler.accept(token);

            if self.model.is_eog_token(token) {
                break;
            }
            sequence.push(token.0 as u32);

            batch.clear();
            batch.add(token, n_cur, &[0], true).map_err(generation_err)?;
            ctx.decode(&mut batch).map_err(generation_err)?;

            n_cur += 1;
            n_decode += 1;
        }

        let t_main_end = ggml_time_us();
        let duration = Duration::from_micros((t_main_end - t_main_start).max(0) as u64);
        info!(
            "decoded {} tokens in {:.2} s, speed {:.2} t/s",
            n_decode,
            duration.as_secs_f32(),
            n_decode as f32 / duration.as_secs_f32().max(0.001)
        );

        Ok(GeneratedTokens::new(sequence, prompt_len))
    }

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, Error> {
        let special = if skip_special_tokens {
            Special::Plaintext
        } else {
            Special::Tokenize
        };

        let mut bytes = Vec::new();
        for token in tokens {
            let piece = self
                .model
                .token_to_bytes(LlamaToken(*token as i32), special)
                .map_err(generation_err)?;
            bytes.extend(piece);
        }
        Ok(String::from_utf8_lossy(&bytes).to_string())
    }
}
