use crate::renderer::BufferingThrottle;
use crate::source::BrowseStreamer;
use mediabridge_core::{Extension, Renderer, SignalHandlerId, Source};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Unique id of one export of an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExportId(pub u64);

/// Kind tag of an exported extension plus the state only that kind needs.
pub(crate) enum ObjectKind {
    Source {
        source: Rc<dyn Source>,
        browse: Rc<BrowseStreamer>,
    },
    Renderer {
        renderer: Rc<dyn Renderer>,
        buffering: Rc<BufferingThrottle>,
    },
}

impl ObjectKind {
    pub fn extension(&self) -> &dyn Extension {
        match self {
            ObjectKind::Source { source, .. } => source.as_extension(),
            ObjectKind::Renderer { renderer, .. } => renderer.as_extension(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectKind::Source { .. } => "source",
            ObjectKind::Renderer { .. } => "renderer",
        }
    }
}

pub(crate) struct ExportedObject {
    pub id: ExportId,
    pub uuid: String,
    pub name: String,
    pub service_name: String,
    pub path: String,
    pub kind: ObjectKind,
    pub handlers: Vec<SignalHandlerId>,
}

impl ExportedObject {
    pub fn extension(&self) -> &dyn Extension {
        self.kind.extension()
    }

    /// Disconnects native handlers and stops timers and in-flight browses.
    pub fn teardown(&self) {
        let extension = self.extension();
        for handler in &self.handlers {
            extension.disconnect(*handler);
        }
        match &self.kind {
            ObjectKind::Source { source, browse } => browse.shutdown(source.as_ref()),
            ObjectKind::Renderer { buffering, .. } => buffering.reset(),
        }
    }
}

/// Exported objects indexed by id, uuid and object path.
#[derive(Default)]
pub(crate) struct Registry {
    objects: RefCell<BTreeMap<ExportId, Rc<ExportedObject>>>,
    by_uuid: RefCell<HashMap<String, ExportId>>,
    by_path: RefCell<HashMap<String, ExportId>>,
    services: RefCell<HashMap<String, usize>>,
    next_id: Cell<u64>,
}

impl Registry {
    pub fn next_id(&self) -> ExportId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        ExportId(id)
    }

    /// Path already taken by another uuid, if any.
    pub fn conflict(&self, uuid: &str, path: &str) -> Option<String> {
        if let Some(id) = self.by_uuid.borrow().get(uuid) {
            return self.get(*id).map(|object| object.path.clone());
        }
        self.by_path
            .borrow()
            .contains_key(path)
            .then(|| path.to_owned())
    }

    pub fn insert(&self, object: ExportedObject) -> Rc<ExportedObject> {
        let object = Rc::new(object);
        self.by_uuid
            .borrow_mut()
            .insert(object.uuid.clone(), object.id);
        self.by_path
            .borrow_mut()
            .insert(object.path.clone(), object.id);
        self.objects
            .borrow_mut()
            .insert(object.id, Rc::clone(&object));
        object
    }

    pub fn remove(&self, uuid: &str) -> Option<Rc<ExportedObject>> {
        let id = self.by_uuid.borrow_mut().remove(uuid)?;
        let object = self.objects.borrow_mut().remove(&id)?;
        self.by_path.borrow_mut().remove(&object.path);
        Some(object)
    }

    pub fn get(&self, id: ExportId) -> Option<Rc<ExportedObject>> {
        self.objects.borrow().get(&id).cloned()
    }

    pub fn by_uuid(&self, uuid: &str) -> Option<Rc<ExportedObject>> {
        let id = *self.by_uuid.borrow().get(uuid)?;
        self.get(id)
    }

    pub fn by_path(&self, path: &str) -> Option<Rc<ExportedObject>> {
        let id = *self.by_path.borrow().get(path)?;
        self.get(id)
    }

    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    /// Counts a user of `service`; true when it is the first one.
    pub fn acquire_service(&self, service: &str) -> bool {
        let mut services = self.services.borrow_mut();
        let users = services.entry(service.to_owned()).or_insert(0);
        *users += 1;
        *users == 1
    }

    /// Drops a user of `service`; true when it was the last one.
    pub fn release_service(&self, service: &str) -> bool {
        let mut services = self.services.borrow_mut();
        match services.get_mut(service) {
            Some(users) if *users > 1 => {
                *users -= 1;
                false
            }
            Some(_) => {
                services.remove(service);
                true
            }
            None => false,
        }
    }
}

/// `<prefix>/<kind>/<uuid>` with the uuid escaped into a path element.
pub(crate) fn object_path(prefix: &str, kind: &str, uuid: &str) -> String {
    format!("{prefix}/{kind}/{}", escape_element(uuid, false))
}

/// `<prefix>.<plugin>` with the plugin escaped into a bus name element.
pub(crate) fn service_name(prefix: &str, plugin: &str) -> String {
    format!("{prefix}.{}", escape_element(plugin, true))
}

fn escape_element(raw: &str, allow_dash: bool) -> String {
    let mut element: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_dash && c == '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if element.is_empty() || (allow_dash && element.starts_with(|c: char| c.is_ascii_digit())) {
        element.insert(0, '_');
    }
    element
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_escape_uuid() {
        assert_eq!(
            object_path("/io/mediabridge", "source", "upnp-src:1.2"),
            "/io/mediabridge/source/upnp_src_1_2"
        );
        assert_eq!(object_path("/p", "renderer", ""), "/p/renderer/_");
    }

    #[test]
    fn service_names_escape_plugin() {
        assert_eq!(
            service_name("io.mediabridge.plugin", "local-tagsource"),
            "io.mediabridge.plugin.local-tagsource"
        );
        assert_eq!(
            service_name("io.mediabridge.plugin", "3d audio"),
            "io.mediabridge.plugin._3d_audio"
        );
    }

    #[test]
    fn services_are_reference_counted() {
        let registry = Registry::default();
        assert!(registry.acquire_service("a.b"));
        assert!(!registry.acquire_service("a.b"));
        assert!(!registry.release_service("a.b"));
        assert!(registry.release_service("a.b"));
        assert!(!registry.release_service("a.b"));
    }
}
