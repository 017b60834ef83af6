//! 模型推理接口，以及串行化访问模型状态的 actor。
//!
//! 模型状态只属于一个后台任务，所有推理请求经由通道排队执行，
//! 调用方只持有可克隆的 [`ModelActor`] 地址。

use crate::{utok, BoxError, Error, Result};
use std::future::Future;
use tokio::sync::{mpsc, oneshot};

/// 模型权重的数值精度，构造模型时确定。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum Precision {
    Int4,
    #[default]
    Fp16,
}

/// 因果语言模型的推理接口。
pub trait ModelInference: Send + 'static {
    fn precision(&self) -> Precision {
        Precision::default()
    }

    /// 输入完整的 token 序列，返回最后一个位置在整个词表上的 logits。
    fn infer(
        &mut self,
        tokens: &[utok],
    ) -> impl Future<Output = Result<Vec<f32>, BoxError>> + Send;
}

struct Request {
    tokens: Vec<utok>,
    response: oneshot::Sender<Result<Vec<f32>, BoxError>>,
}

/// 模型 actor 的地址。
#[derive(Clone, Debug)]
pub struct ModelActor {
    tx: mpsc::UnboundedSender<Request>,
    precision: Precision,
}

impl ModelActor {
    /// 在当前 tokio 运行时上启动持有模型的任务。
    pub fn spawn<M: ModelInference>(mut model: M) -> Self {
        let precision = model.precision();
        let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
        tokio::spawn(async move {
            while let Some(Request { tokens, response }) = rx.recv().await {
                let logits = model.infer(&tokens).await;
                // 调用方可能已放弃等待
                let _ = response.send(logits);
            }
            tracing::debug!("model actor stopped");
        });
        Self { tx, precision }
    }

    #[inline]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// 排队执行一次推理。
    pub async fn infer(&self, tokens: Vec<utok>) -> Result<Vec<f32>> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(Request { tokens, response })
            .map_err(|_| Error::ModelUnavailable)?;
        rx.await
            .map_err(|_| Error::ModelUnavailable)?
            .map_err(Error::InferenceFailure)
    }
}
