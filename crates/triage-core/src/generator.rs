//! 外部文本生成能力接口
//!
//! 分类器只依赖 `generate(prompt, model) -> text | failure` 这一能力，
//! 传输、认证和超时由具体实现负责。

use async_trait::async_trait;

use crate::error::GenerativeError;

/// 文本生成接口
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 生成器名称，用于日志
    fn name(&self) -> &str;

    /// 使用指定模型对提示词生成文本
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, GenerativeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str, model: &str) -> Result<String, GenerativeError> {
            Ok(format!("{model}:{prompt}"))
        }
    }

    #[tokio::test]
    async fn test_generator_is_object_safe() {
        let generator: Arc<dyn TextGenerator> = Arc::new(EchoGenerator);
        let text = generator.generate("hello", "m1").await.unwrap();
        assert_eq!(text, "m1:hello");
        assert_eq!(generator.name(), "echo");
    }
}
