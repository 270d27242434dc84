//! In-memory [`PageContext`] for unit tests

use crate::browser::PageContext;
use crate::error::{Result, ScrapeError};
use async_trait::async_trait;
use serde_json::Value;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = dyn Fn(&str) -> Value + Send + Sync;
type ClickHandler = dyn Fn(&str) + Send + Sync;

/// Answers every `evaluate` through a responder closure and records what it was asked
pub(crate) struct ScriptedPage {
    url: Mutex<String>,
    title: String,
    responder: Arc<Responder>,
    on_click: Option<Arc<ClickHandler>>,
    pub scripts: Mutex<Vec<String>>,
    pub clicks: Mutex<Vec<String>>,
    pub gotos: Mutex<Vec<String>>,
}

impl ScriptedPage {
    pub fn new(url: &str, title: &str, responder: impl Fn(&str) -> Value + Send + Sync + 'static) -> Self {
        Self::shared(url, title, Arc::new(responder), None)
    }

    fn shared(url: &str, title: &str, responder: Arc<Responder>, on_click: Option<Arc<ClickHandler>>) -> Self {
        Self {
            url: Mutex::new(url.to_string()),
            title: title.to_string(),
            responder,
            on_click,
            scripts: Mutex::new(Vec::new()),
            clicks: Mutex::new(Vec::new()),
            gotos: Mutex::new(Vec::new()),
        }
    }

    /// Run `handler` with the selector of every native click, forks included
    pub fn on_click(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_click = Some(Arc::new(handler));
        self
    }

    pub fn evaluated(&self, needle: &str) -> usize {
        self.scripts.lock().unwrap().iter().filter(|s| s.contains(needle)).count()
    }
}

/// The JSON argument object of a rendered page script
pub(crate) fn script_args(script: &str) -> Value {
    let script = script.trim_end();
    let start = script.rfind("})(").map(|i| i + 3).unwrap_or(0);
    let args = script[start..].strip_suffix(')').unwrap_or("");
    serde_json::from_str(args).unwrap_or(Value::Null)
}

/// A small white PNG
pub(crate) fn blank_png() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(32, 32, image::Rgba([255, 255, 255, 255])))
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

#[async_trait]
impl PageContext for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<()> {
        *self.url.lock().unwrap() = url.to_string();
        self.gotos.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.title.clone())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.scripts.lock().unwrap().push(expression.to_string());
        Ok((self.responder)(expression))
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>> {
        Ok(blank_png())
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.clicks.lock().unwrap().push(selector.to_string());
        if let Some(handler) = &self.on_click {
            handler(selector);
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, _text: &str, _timeout: Duration) -> Result<()> {
        Err(ScrapeError::ElementNotFound(selector.to_string()))
    }

    async fn press_key(&self, selector: &str, _key: &str, _timeout: Duration) -> Result<()> {
        Err(ScrapeError::ElementNotFound(selector.to_string()))
    }

    async fn fork(&self) -> Result<Arc<dyn PageContext>> {
        let url = self.url.lock().unwrap().clone();
        Ok(Arc::new(ScriptedPage::shared(
            &url,
            &self.title,
            Arc::clone(&self.responder),
            self.on_click.clone(),
        )))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
