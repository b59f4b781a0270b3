//! Scripted automation surface
//!
//! Serves a fixed list of items per location and records every call so
//! tests can assert on teardown and navigation.

use async_trait::async_trait;
use gleaner_acq::surface::{
    AutomationSurface, Credentials, FetchOutcome, RawImage, RawItem, SurfaceError, SurfaceFactory,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// One scripted item
#[derive(Debug, Clone, Default)]
pub struct MockItem {
    pub images: Vec<Vec<u8>>,
    pub attributes: HashMap<String, f64>,
}

impl MockItem {
    pub fn with_images(images: Vec<Vec<u8>>) -> Self {
        Self {
            images,
            attributes: HashMap::new(),
        }
    }
}

/// Calls observed across all surfaces created by a factory
#[derive(Debug, Default, Clone)]
pub struct SurfaceLog {
    pub created: usize,
    pub authenticated: bool,
    pub locations_set: Vec<String>,
    pub fetches: usize,
    pub rejects: usize,
    pub shutdowns: usize,
}

type Script = HashMap<String, Vec<MockItem>>;

pub struct ScriptedFactory {
    script: Arc<Script>,
    fail_create: bool,
    fail_auth: bool,
    log: Arc<Mutex<SurfaceLog>>,
    cancel_after: Arc<Mutex<Option<(usize, CancellationToken)>>>,
}

impl ScriptedFactory {
    pub fn new(script: Vec<(&str, Vec<MockItem>)>) -> Self {
        Self {
            script: Arc::new(
                script
                    .into_iter()
                    .map(|(location, items)| (location.to_string(), items))
                    .collect(),
            ),
            fail_create: false,
            fail_auth: false,
            log: Arc::new(Mutex::new(SurfaceLog::default())),
            cancel_after: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_auth(mut self) -> Self {
        self.fail_auth = true;
        self
    }

    /// Cancel `token` once `rejects` items have been rejected
    pub fn cancel_after_rejects(&self, rejects: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((rejects, token));
    }

    pub fn log(&self) -> SurfaceLog {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl SurfaceFactory for ScriptedFactory {
    async fn create(&self) -> Result<Box<dyn AutomationSurface>, SurfaceError> {
        if self.fail_create {
            return Err(SurfaceError::Driver("browser binary missing".to_string()));
        }
        self.log.lock().unwrap().created += 1;
        Ok(Box::new(ScriptedSurface {
            script: self.script.clone(),
            fail_auth: self.fail_auth,
            log: self.log.clone(),
            cancel_after: self.cancel_after.clone(),
            cursor: Mutex::new(Cursor::default()),
        }))
    }
}

#[derive(Default)]
struct Cursor {
    location: Option<String>,
    next_index: HashMap<String, usize>,
}

struct ScriptedSurface {
    script: Arc<Script>,
    fail_auth: bool,
    log: Arc<Mutex<SurfaceLog>>,
    cancel_after: Arc<Mutex<Option<(usize, CancellationToken)>>>,
    cursor: Mutex<Cursor>,
}

impl ScriptedSurface {
    fn item(&self, handle: &str) -> Option<&MockItem> {
        let (location, index) = handle.rsplit_once('#')?;
        let index: usize = index.parse().ok()?;
        self.script.get(location)?.get(index)
    }
}

#[async_trait]
impl AutomationSurface for ScriptedSurface {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<(), SurfaceError> {
        if self.fail_auth {
            return Err(SurfaceError::Auth("invalid username or password".to_string()));
        }
        self.log.lock().unwrap().authenticated = true;
        Ok(())
    }

    async fn set_active_location(&self, location: &str) -> Result<(), SurfaceError> {
        self.cursor.lock().unwrap().location = Some(location.to_string());
        self.log.lock().unwrap().locations_set.push(location.to_string());
        Ok(())
    }

    async fn fetch_next_item(&self) -> Result<FetchOutcome, SurfaceError> {
        self.log.lock().unwrap().fetches += 1;

        let mut cursor = self.cursor.lock().unwrap();
        let location = cursor
            .location
            .clone()
            .ok_or_else(|| SurfaceError::Driver("no active location".to_string()))?;
        let items = self.script.get(&location).map(Vec::len).unwrap_or(0);

        let index = cursor.next_index.entry(location.clone()).or_insert(0);
        if *index >= items {
            return Ok(FetchOutcome::NoMoreItems);
        }

        let handle = format!("{}#{}", location, index);
        *index += 1;
        let attributes = self
            .item(&handle)
            .map(|item| item.attributes.clone())
            .unwrap_or_default();
        Ok(FetchOutcome::Item(RawItem { handle, attributes }))
    }

    async fn extract_images(&self, item: &RawItem) -> Result<Vec<RawImage>, SurfaceError> {
        let scripted = self
            .item(&item.handle)
            .ok_or_else(|| SurfaceError::NotFound(item.handle.clone()))?;
        Ok(scripted
            .images
            .iter()
            .map(|data| RawImage::Bytes {
                data: data.clone(),
                source_url: None,
            })
            .collect())
    }

    async fn reject_current_item(&self) -> Result<(), SurfaceError> {
        let rejects = {
            let mut log = self.log.lock().unwrap();
            log.rejects += 1;
            log.rejects
        };

        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if rejects >= *after {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SurfaceError> {
        self.log.lock().unwrap().shutdowns += 1;
        Ok(())
    }
}
