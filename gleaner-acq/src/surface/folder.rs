//! Offline automation surface over a directory tree
//!
//! Layout: `<root>/<location-slug>/<item>/<images>`. Each item directory may
//! also hold `attributes.json` (a map of numeric attributes used as label
//! anchors) and `urls.txt` (one image URL per line, downloaded by the
//! controller).

use super::locator::{locate_first, Located};
use super::{
    AutomationSurface, Credentials, FetchOutcome, RawImage, RawItem, SurfaceError, SurfaceFactory,
};
use crate::services::naming::location_slug;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const ATTRIBUTES_FILE: &str = "attributes.json";
const URLS_FILE: &str = "urls.txt";
const LOCATE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FolderSurfaceFactory {
    root: PathBuf,
    required: Option<Credentials>,
}

impl FolderSurfaceFactory {
    /// `required`: credentials the surface insists on (any are accepted when `None`)
    pub fn new(root: impl Into<PathBuf>, required: Option<Credentials>) -> Self {
        Self {
            root: root.into(),
            required,
        }
    }
}

#[async_trait]
impl SurfaceFactory for FolderSurfaceFactory {
    async fn create(&self) -> Result<Box<dyn AutomationSurface>, SurfaceError> {
        if !self.root.is_dir() {
            return Err(SurfaceError::Driver(format!(
                "source folder not found: {}",
                self.root.display()
            )));
        }
        info!(root = %self.root.display(), "Folder surface created");
        Ok(Box::new(FolderSurface::new(self.root.clone(), self.required.clone())))
    }
}

#[derive(Default)]
struct FolderState {
    authenticated: bool,
    shut_down: bool,
    location: Option<String>,
    queue: VecDeque<PathBuf>,
    current: Option<(RawItem, PathBuf)>,
}

pub struct FolderSurface {
    root: PathBuf,
    required: Option<Credentials>,
    state: Mutex<FolderState>,
}

impl FolderSurface {
    pub fn new(root: PathBuf, required: Option<Credentials>) -> Self {
        Self {
            root,
            required,
            state: Mutex::new(FolderState::default()),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, FolderState>, SurfaceError> {
        let state = self
            .state
            .lock()
            .map_err(|_| SurfaceError::Driver("surface state poisoned".to_string()))?;
        if state.shut_down {
            return Err(SurfaceError::Driver("surface already shut down".to_string()));
        }
        Ok(state)
    }

    /// Directory for a location: slug first, then the lowercased and raw tag
    async fn location_dir(&self, location: &str) -> Option<PathBuf> {
        let slug = location_slug(location);
        let lower = location.trim().to_lowercase();
        let candidates = [slug.as_str(), lower.as_str(), location.trim()];

        let root = self.root.clone();
        let found = locate_first(&candidates, LOCATE_TIMEOUT, |name| {
            let dir = name_is_safe(name).then(|| root.join(name));
            async move {
                match dir {
                    Some(dir) if dir.is_dir() => Located::Found(dir),
                    _ => Located::NotFound,
                }
            }
        })
        .await;

        found.found()
    }
}

/// A single plain path segment, so the joined directory stays a direct child of the root
fn name_is_safe(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn sorted_entries(dir: &Path, want_dirs: bool) -> Vec<PathBuf> {
    let entries: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir() == want_dirs)
        .map(|e| e.into_path())
        .collect();
    entries
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|i| i.eq_ignore_ascii_case(ext)))
}

fn read_attributes(item_dir: &Path) -> HashMap<String, f64> {
    let path = item_dir.join(ATTRIBUTES_FILE);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return HashMap::new();
    };
    match serde_json::from_str(&content) {
        Ok(attributes) => attributes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed attributes file");
            HashMap::new()
        }
    }
}

#[async_trait]
impl AutomationSurface for FolderSurface {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), SurfaceError> {
        if let Some(required) = &self.required {
            if required != credentials {
                return Err(SurfaceError::Auth(format!(
                    "credentials rejected for user {:?}",
                    credentials.username
                )));
            }
        }
        self.state()?.authenticated = true;
        Ok(())
    }

    async fn set_active_location(&self, location: &str) -> Result<(), SurfaceError> {
        let dir = self.location_dir(location).await;

        let queue: VecDeque<PathBuf> = match &dir {
            Some(dir) => sorted_entries(dir, true).into(),
            None => {
                warn!(location, "No folder for location, treating it as empty");
                VecDeque::new()
            }
        };

        debug!(location, items = queue.len(), "Active location set");

        let mut state = self.state()?;
        state.location = Some(location.to_string());
        state.queue = queue;
        state.current = None;
        Ok(())
    }

    async fn fetch_next_item(&self) -> Result<FetchOutcome, SurfaceError> {
        let mut state = self.state()?;
        if !state.authenticated {
            return Err(SurfaceError::Auth("not logged in".to_string()));
        }
        if state.location.is_none() {
            return Err(SurfaceError::Driver("no active location".to_string()));
        }

        if let Some((item, _)) = &state.current {
            return Ok(FetchOutcome::Item(item.clone()));
        }

        let Some(dir) = state.queue.pop_front() else {
            return Ok(FetchOutcome::NoMoreItems);
        };

        let item = RawItem {
            handle: dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            attributes: read_attributes(&dir),
        };
        state.current = Some((item.clone(), dir));
        Ok(FetchOutcome::Item(item))
    }

    async fn extract_images(&self, item: &RawItem) -> Result<Vec<RawImage>, SurfaceError> {
        let dir = {
            let state = self.state()?;
            match &state.current {
                Some((current, dir)) if current.handle == item.handle => dir.clone(),
                _ => return Err(SurfaceError::NotFound(format!("item {}", item.handle))),
            }
        };

        let mut images = Vec::new();
        for path in sorted_entries(&dir, false).into_iter().filter(|p| is_image_file(p)) {
            let data = tokio::fs::read(&path).await?;
            images.push(RawImage::Bytes {
                data,
                source_url: Some(format!("file://{}", path.display())),
            });
        }

        match tokio::fs::read_to_string(dir.join(URLS_FILE)).await {
            Ok(content) => images.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(|l| RawImage::Url(l.to_string())),
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(images)
    }

    async fn reject_current_item(&self) -> Result<(), SurfaceError> {
        self.state()?.current = None;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SurfaceError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SurfaceError::Driver("surface state poisoned".to_string()))?;
        state.shut_down = true;
        state.queue.clear();
        state.current = None;
        info!(root = %self.root.display(), "Folder surface shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let paris = dir.path().join("paris");
        for item in ["a", "b"] {
            let item_dir = paris.join(item);
            std::fs::create_dir_all(&item_dir).unwrap();
            std::fs::write(item_dir.join("1.jpg"), b"one").unwrap();
            std::fs::write(item_dir.join("2.png"), b"two").unwrap();
            std::fs::write(item_dir.join("notes.txt"), b"ignored").unwrap();
        }
        std::fs::write(paris.join("a").join(ATTRIBUTES_FILE), r#"{"age": 29}"#).unwrap();
        std::fs::write(paris.join("b").join(URLS_FILE), "https://x/y.jpg\n\n# c\n").unwrap();
        dir
    }

    async fn logged_in(root: &Path) -> FolderSurface {
        let surface = FolderSurface::new(root.to_path_buf(), None);
        surface.authenticate(&Credentials::default()).await.unwrap();
        surface
    }

    #[tokio::test]
    async fn test_items_served_in_order_until_exhausted() {
        let tree = make_tree();
        let surface = logged_in(tree.path()).await;
        surface.set_active_location("Paris, France").await.unwrap();

        let FetchOutcome::Item(first) = surface.fetch_next_item().await.unwrap() else {
            panic!("expected item");
        };
        assert_eq!(first.handle, "a");
        assert_eq!(first.attributes.get("age"), Some(&29.0));

        // current item stays until rejected
        assert_eq!(surface.fetch_next_item().await.unwrap(), FetchOutcome::Item(first));

        surface.reject_current_item().await.unwrap();
        let FetchOutcome::Item(second) = surface.fetch_next_item().await.unwrap() else {
            panic!("expected item");
        };
        assert_eq!(second.handle, "b");

        let images = surface.extract_images(&second).await.unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[2], RawImage::Url("https://x/y.jpg".to_string()));

        surface.reject_current_item().await.unwrap();
        assert_eq!(surface.fetch_next_item().await.unwrap(), FetchOutcome::NoMoreItems);
    }

    #[tokio::test]
    async fn test_missing_location_is_empty() {
        let tree = make_tree();
        let surface = logged_in(tree.path()).await;
        surface.set_active_location("Tokyo").await.unwrap();
        assert_eq!(surface.fetch_next_item().await.unwrap(), FetchOutcome::NoMoreItems);
    }

    #[test]
    fn test_name_is_safe() {
        assert!(name_is_safe("paris"));
        assert!(name_is_safe("new-york"));
        for name in ["", ".", "..", "../paris", "paris/..", "a/b", "/etc"] {
            assert!(!name_is_safe(name), "{:?} accepted", name);
        }
    }

    #[tokio::test]
    async fn test_parent_dir_tag_cannot_leave_root() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("secret_item");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("x.jpg"), b"private").unwrap();
        let root = dir.path().join("source");
        std::fs::create_dir_all(root.join("paris").join("a")).unwrap();

        let surface = logged_in(&root).await;
        for tag in ["..", "../"] {
            surface.set_active_location(tag).await.unwrap();
            assert_eq!(
                surface.fetch_next_item().await.unwrap(),
                FetchOutcome::NoMoreItems,
                "tag {:?} served an item",
                tag
            );
        }
    }

    #[tokio::test]
    async fn test_wrong_credentials_rejected() {
        let tree = make_tree();
        let surface = FolderSurface::new(
            tree.path().to_path_buf(),
            Some(Credentials::new("user", "secret")),
        );
        let err = surface
            .authenticate(&Credentials::new("user", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, SurfaceError::Auth(_)));
    }

    #[tokio::test]
    async fn test_fetch_requires_login_and_shutdown_is_final() {
        let tree = make_tree();
        let surface = FolderSurface::new(tree.path().to_path_buf(), None);
        surface.set_active_location("paris").await.unwrap();
        assert!(matches!(
            surface.fetch_next_item().await,
            Err(SurfaceError::Auth(_))
        ));

        surface.shutdown().await.unwrap();
        assert!(matches!(
            surface.authenticate(&Credentials::default()).await,
            Err(SurfaceError::Driver(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_requires_existing_root() {
        let factory = FolderSurfaceFactory::new("/definitely/not/here", None);
        assert!(matches!(factory.create().await, Err(SurfaceError::Driver(_))));
    }
}
