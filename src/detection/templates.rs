//! Template lookup and loading
//!
//! Weapon and menu templates are small PNG crops of the HUD. Each one is
//! loaded and hashed once when a session starts.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::autoclick::DelayProfile;
use crate::config::{SessionConfig, WeaponConfig};
use crate::vision::{HashDetector, PerceptualHash};

/// Menu template filename
pub const MENU_TEMPLATE: &str = "menu.png";

/// Finds template files by name
pub trait TemplateResolver: Send + Sync {
    /// Full path of `filename`, or `None` if it exists nowhere
    fn resolve(&self, filename: &str) -> Option<PathBuf>;
}

/// Image directory layout
///
/// User captures in `captured/` take priority over the shipped defaults in
/// `templates/`, and the root itself is checked last for older installs.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn captured_dir(&self) -> PathBuf {
        self.root.join("captured")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.root.join("previews")
    }

    /// Where a newly captured template is written
    pub fn captured_path(&self, filename: &str) -> PathBuf {
        self.captured_dir().join(filename)
    }

    /// Where a debug capture is written
    pub fn preview_path(&self, filename: &str) -> PathBuf {
        self.previews_dir().join(filename)
    }
}

impl TemplateResolver for DirectoryResolver {
    fn resolve(&self, filename: &str) -> Option<PathBuf> {
        [self.captured_dir(), self.templates_dir(), self.root.clone()]
            .into_iter()
            .map(|dir| dir.join(filename))
            .find(|path| path.is_file())
    }
}

/// Weapon slot on the HUD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    One,
    Two,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::One => Slot::Two,
            Slot::Two => Slot::One,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::One => write!(f, "slot 1"),
            Slot::Two => write!(f, "slot 2"),
        }
    }
}

/// A loaded and hashed template image
#[derive(Debug, Clone)]
pub struct Template {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub hash: PerceptualHash,
}

/// A weapon with at least one slot template
#[derive(Debug, Clone)]
pub struct WeaponTemplate {
    pub id: String,
    pub name: String,
    pub profile: String,
    pub delays: DelayProfile,
    slot1: Option<Template>,
    slot2: Option<Template>,
}

impl WeaponTemplate {
    /// Build from slot templates; `None` when both are missing
    pub fn new(
        config: &WeaponConfig,
        slot1: Option<Template>,
        slot2: Option<Template>,
    ) -> Option<Self> {
        if slot1.is_none() && slot2.is_none() {
            return None;
        }
        Some(Self {
            id: config.id.clone(),
            name: config.name.clone(),
            profile: config.profile.clone(),
            delays: config.delays,
            slot1,
            slot2,
        })
    }

    /// The template captured for exactly this slot
    pub fn template(&self, slot: Slot) -> Option<&Template> {
        match slot {
            Slot::One => self.slot1.as_ref(),
            Slot::Two => self.slot2.as_ref(),
        }
    }

    /// Hash to compare a slot against, borrowing the other slot's if needed
    pub fn hash_for_slot(&self, slot: Slot) -> Option<&PerceptualHash> {
        self.template(slot)
            .or_else(|| self.template(slot.other()))
            .map(|t| &t.hash)
    }
}

/// Every template a detection session compares against
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    weapons: Vec<WeaponTemplate>,
    menu: Option<Template>,
}

impl TemplateStore {
    /// Assemble a store from already-loaded templates
    pub fn from_parts(weapons: Vec<WeaponTemplate>, menu: Option<Template>) -> Self {
        Self { weapons, menu }
    }

    /// Load and hash the templates of every configured weapon plus the menu
    ///
    /// Weapons with no loadable template are skipped with a warning.
    pub fn load(
        config: &SessionConfig,
        detector: &HashDetector,
        resolver: &dyn TemplateResolver,
    ) -> Self {
        let mut weapons = Vec::new();

        for weapon in &config.weapons {
            let slot1 = load_template(detector, resolver, &weapon.slot1_template);
            let slot2 = load_template(detector, resolver, &weapon.slot2_template);

            let Some(loaded) = WeaponTemplate::new(weapon, slot1, slot2) else {
                log::warn!("Skipping weapon '{}': no valid templates found", weapon.name);
                continue;
            };

            log::info!("Loaded weapon '{}' ({} profile, {})", loaded.name, loaded.profile, loaded.delays);
            for slot in [Slot::One, Slot::Two] {
                match loaded.template(slot) {
                    Some(t) => log::info!("  {}: {} (hash: {})", slot, t.path.display(), t.hash),
                    None => log::warn!("  {} template missing, using {} template", slot, slot.other()),
                }
            }
            weapons.push(loaded);
        }

        if weapons.is_empty() {
            log::warn!("No weapon templates loaded");
        } else {
            let ids: Vec<&str> = weapons.iter().map(|w| w.id.as_str()).collect();
            log::info!("Loaded {} weapon(s): {}", weapons.len(), ids.join(", "));
        }

        let menu = load_template(detector, resolver, MENU_TEMPLATE);
        match &menu {
            Some(t) => log::info!(
                "Menu template loaded: {}x{} pixels (hash: {})",
                t.width,
                t.height,
                t.hash
            ),
            None => log::warn!("No menu template, menu detection disabled. Use --capture-template menu"),
        }

        Self { weapons, menu }
    }

    pub fn weapons(&self) -> &[WeaponTemplate] {
        &self.weapons
    }

    pub fn menu(&self) -> Option<&Template> {
        self.menu.as_ref()
    }

    pub fn weapon(&self, id: &str) -> Option<&WeaponTemplate> {
        self.weapons.iter().find(|w| w.id == id)
    }

    pub fn has_weapons(&self) -> bool {
        !self.weapons.is_empty()
    }
}

/// Resolve, load and hash one template; any failure yields `None`
fn load_template(
    detector: &HashDetector,
    resolver: &dyn TemplateResolver,
    filename: &str,
) -> Option<Template> {
    let Some(path) = resolver.resolve(filename) else {
        log::debug!("Template not found: {}", filename);
        return None;
    };

    let image = match detector.load_image(&path) {
        Ok(Some(image)) => image,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("{}", e);
            return None;
        }
    };

    match detector.calculate_gray_hash(&image) {
        Ok(hash) => Some(Template {
            width: image.width(),
            height: image.height(),
            path,
            hash,
        }),
        Err(e) => {
            log::warn!("Failed to hash template {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use image::{GrayImage, ImageBuffer, Luma};
    use std::fs;

    fn noise(seed: u32) -> GrayImage {
        ImageBuffer::from_fn(63, 22, |x, y| {
            let mut v = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ seed.wrapping_mul(83_492_791);
            v ^= v >> 13;
            v = v.wrapping_mul(0x5bd1_e995);
            v ^= v >> 15;
            Luma([(v & 0xff) as u8])
        })
    }

    fn write_png(dir: &Path, name: &str, image: &GrayImage) {
        fs::create_dir_all(dir).unwrap();
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_resolver_prefers_captured_over_templates() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = DirectoryResolver::new(tmp.path());

        write_png(tmp.path(), "menu.png", &noise(1));
        assert_eq!(resolver.resolve("menu.png"), Some(tmp.path().join("menu.png")));

        write_png(&resolver.templates_dir(), "menu.png", &noise(1));
        assert_eq!(
            resolver.resolve("menu.png"),
            Some(resolver.templates_dir().join("menu.png"))
        );

        write_png(&resolver.captured_dir(), "menu.png", &noise(1));
        assert_eq!(resolver.resolve("menu.png"), Some(resolver.captured_path("menu.png")));

        assert_eq!(resolver.resolve("missing.png"), None);
    }

    #[test]
    fn test_store_loads_slots_with_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = DirectoryResolver::new(tmp.path());
        let templates = resolver.templates_dir();

        // kettle: both slots; burletta: slot 1 only
        write_png(&templates, "kettle_slot1.png", &noise(1));
        write_png(&templates, "kettle_slot2.png", &noise(2));
        write_png(&templates, "burletta_slot1.png", &noise(3));
        write_png(&templates, MENU_TEMPLATE, &noise(4));

        let mut config = Settings::default().normalize().unwrap();
        config.image_dir = tmp.path().to_path_buf();
        let detector = HashDetector::default();
        let store = TemplateStore::load(&config, &detector, &resolver);

        assert_eq!(store.weapons().len(), 2);
        assert!(store.menu().is_some());

        let kettle = store.weapon("kettle").unwrap();
        assert_ne!(kettle.hash_for_slot(Slot::One), kettle.hash_for_slot(Slot::Two));

        let burletta = store.weapon("burletta").unwrap();
        assert!(burletta.template(Slot::Two).is_none());
        assert_eq!(
            burletta.hash_for_slot(Slot::Two),
            burletta.hash_for_slot(Slot::One)
        );
    }

    #[test]
    fn test_weapon_without_templates_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = DirectoryResolver::new(tmp.path());
        write_png(tmp.path(), "kettle_slot2.png", &noise(1));

        let config = Settings::default().normalize().unwrap();
        let store = TemplateStore::load(&config, &HashDetector::default(), &resolver);

        assert_eq!(store.weapons().len(), 1);
        assert_eq!(store.weapons()[0].id, "kettle");
        assert!(store.menu().is_none());
    }

    #[test]
    fn test_corrupt_template_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = DirectoryResolver::new(tmp.path());
        fs::write(tmp.path().join(MENU_TEMPLATE), b"not a png").unwrap();

        let config = Settings::default().normalize().unwrap();
        let store = TemplateStore::load(&config, &HashDetector::default(), &resolver);

        assert!(!store.has_weapons());
        assert!(store.menu().is_none());
    }
}
