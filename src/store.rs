// Persistent configuration
//
// Two independent groups live in a namespaced string key-value store:
//   wifi   -> ssid, pass
//   device -> name, description, location
//
// `ConfigStore` is the typed view the rest of the firmware uses. Each
// load/save is one read or write group closed by a single commit, so
// nothing stays open between unrelated operations.
//
// The on-flash image is plain text, one `namespace.key=value` per line,
// with `\\` and `\n` escaped so values may contain anything.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use core::fmt;

use crate::identity::DeviceIdentity;

pub const WIFI_NAMESPACE: &str = "wifi";
pub const DEVICE_NAMESPACE: &str = "device";

const KEY_SSID: &str = "ssid";
const KEY_PASS: &str = "pass";
const KEY_NAME: &str = "name";
const KEY_DESCRIPTION: &str = "description";
const KEY_LOCATION: &str = "location";

pub const DEFAULT_DESCRIPTION: &str = "Temperature Sensor";
pub const DEFAULT_LOCATION: &str = "Unknown Location";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    NoSpace,
    Corrupt,
    Io,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::NoSpace => write!(f, "storage full"),
            Self::Corrupt => write!(f, "stored image is corrupt"),
            Self::Io => write!(f, "flash access failed"),
        }
    }
}

/// Namespaced string store that survives power loss.
///
/// `set` and `clear` may be buffered until `commit`.
pub trait KvStore {
    fn get(&self, namespace: &str, key: &str) -> Result<String, StoreError>;
    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError>;
    /// Remove every key in `namespace`.
    fn clear(&mut self, namespace: &str) -> Result<(), StoreError>;
    fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<S: KvStore + ?Sized> KvStore for &mut S {
    fn get(&self, namespace: &str, key: &str) -> Result<String, StoreError> {
        (**self).get(namespace, key)
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(namespace, key, value)
    }

    fn clear(&mut self, namespace: &str) -> Result<(), StoreError> {
        (**self).clear(namespace)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        (**self).commit()
    }
}

// ── RAM store ───────────────────────────────────────────────────────

/// In-memory store. Also the write-back cache behind the flash store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemStore {
    entries: BTreeMap<(String, String), String>,
}

impl MemStore {
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the text image. Malformed lines are skipped.
    pub fn from_txt(data: &str) -> Self {
        let mut store = Self::new();
        for line in data.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((path, raw)) = line.split_once('=') else {
                continue;
            };
            let Some((ns, key)) = path.trim().split_once('.') else {
                continue;
            };
            if ns.is_empty() || key.is_empty() {
                continue;
            }
            store
                .entries
                .insert((ns.to_string(), key.to_string()), unescape(raw));
        }
        store
    }

    /// Render the text image parsed by [`MemStore::from_txt`].
    pub fn to_txt(&self) -> String {
        let mut out = String::from("# tempnode config\n");
        for ((ns, key), val) in &self.entries {
            out.push_str(ns);
            out.push('.');
            out.push_str(key);
            out.push('=');
            escape_into(&mut out, val);
            out.push('\n');
        }
        out
    }
}

impl KvStore for MemStore {
    fn get(&self, namespace: &str, key: &str) -> Result<String, StoreError> {
        self.entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn clear(&mut self, namespace: &str) -> Result<(), StoreError> {
        self.entries.retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}

fn escape_into(out: &mut String, val: &str) {
    for c in val.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

// ── Typed records ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCredentials {
    pub ssid: String,
    pub password: String,
}

impl NetworkCredentials {
    pub fn new(ssid: &str, password: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
        }
    }

    /// Both fields are required to attempt a join.
    pub fn is_complete(&self) -> bool {
        !self.ssid.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub display_name: String,
    pub friendly_description: String,
    pub location: String,
}

impl DeviceProfile {
    pub fn defaults(identity: &DeviceIdentity) -> Self {
        Self {
            display_name: identity.default_name().to_string(),
            friendly_description: DEFAULT_DESCRIPTION.to_string(),
            location: DEFAULT_LOCATION.to_string(),
        }
    }

    /// Location to advertise to the hub, if the user set one.
    pub fn suggested_area(&self) -> Option<&str> {
        if self.location == DEFAULT_LOCATION {
            None
        } else {
            Some(&self.location)
        }
    }
}

// ── Typed adapter ───────────────────────────────────────────────────

pub struct ConfigStore<S> {
    kv: S,
}

impl<S: KvStore> ConfigStore<S> {
    pub const fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn inner(&self) -> &S {
        &self.kv
    }

    pub fn into_inner(self) -> S {
        self.kv
    }

    /// `None` unless both ssid and password are stored and non-empty.
    pub fn load_credentials(&self) -> Option<NetworkCredentials> {
        let ssid = self.read(WIFI_NAMESPACE, KEY_SSID)?;
        let password = self.read(WIFI_NAMESPACE, KEY_PASS)?;
        let creds = NetworkCredentials { ssid, password };
        creds.is_complete().then_some(creds)
    }

    pub fn save_credentials(&mut self, creds: &NetworkCredentials) -> Result<(), StoreError> {
        self.write_credentials(creds)?;
        self.kv.commit()
    }

    pub fn clear_credentials(&mut self) -> Result<(), StoreError> {
        self.kv.clear(WIFI_NAMESPACE)?;
        self.kv.commit()
    }

    /// Stored profile, with identity-derived defaults for missing fields.
    pub fn load_profile(&self, identity: &DeviceIdentity) -> DeviceProfile {
        let mut profile = DeviceProfile::defaults(identity);
        if let Some(v) = self.read(DEVICE_NAMESPACE, KEY_NAME) {
            profile.display_name = v;
        }
        if let Some(v) = self.read(DEVICE_NAMESPACE, KEY_DESCRIPTION) {
            profile.friendly_description = v;
        }
        if let Some(v) = self.read(DEVICE_NAMESPACE, KEY_LOCATION) {
            profile.location = v;
        }
        profile
    }

    pub fn save_profile(&mut self, profile: &DeviceProfile) -> Result<(), StoreError> {
        self.write_profile(profile)?;
        self.kv.commit()
    }

    /// Persist a provisioning submission as one write group.
    pub fn save_all(
        &mut self,
        creds: &NetworkCredentials,
        profile: &DeviceProfile,
    ) -> Result<(), StoreError> {
        self.write_credentials(creds)?;
        self.write_profile(profile)?;
        self.kv.commit()
    }

    fn read(&self, namespace: &str, key: &str) -> Option<String> {
        match self.kv.get(namespace, key) {
            Ok(v) => Some(v),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                log::warn!("store: read {}.{} failed: {}", namespace, key, e);
                None
            }
        }
    }

    fn write_credentials(&mut self, creds: &NetworkCredentials) -> Result<(), StoreError> {
        self.kv.set(WIFI_NAMESPACE, KEY_SSID, &creds.ssid)?;
        self.kv.set(WIFI_NAMESPACE, KEY_PASS, &creds.password)
    }

    fn write_profile(&mut self, profile: &DeviceProfile) -> Result<(), StoreError> {
        self.kv.set(DEVICE_NAMESPACE, KEY_NAME, &profile.display_name)?;
        self.kv
            .set(DEVICE_NAMESPACE, KEY_DESCRIPTION, &profile.friendly_description)?;
        self.kv.set(DEVICE_NAMESPACE, KEY_LOCATION, &profile.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::from_mac([0x34, 0x85, 0x18, 0xa1, 0xb2, 0xc3])
    }

    #[derive(Default)]
    struct CountingStore {
        inner: MemStore,
        commits: usize,
    }

    impl KvStore for CountingStore {
        fn get(&self, ns: &str, key: &str) -> Result<String, StoreError> {
            self.inner.get(ns, key)
        }
        fn set(&mut self, ns: &str, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(ns, key, value)
        }
        fn clear(&mut self, ns: &str) -> Result<(), StoreError> {
            self.inner.clear(ns)
        }
        fn commit(&mut self) -> Result<(), StoreError> {
            self.commits += 1;
            Ok(())
        }
    }

    #[test]
    fn empty_store_has_no_credentials_and_default_profile() {
        let store = ConfigStore::new(MemStore::new());
        assert_eq!(store.load_credentials(), None);

        let profile = store.load_profile(&identity());
        assert_eq!(profile.display_name, "TempSensor_b2c3");
        assert_eq!(profile.friendly_description, "Temperature Sensor");
        assert_eq!(profile.location, "Unknown Location");
    }

    #[test]
    fn empty_password_counts_as_unprovisioned() {
        let mut kv = MemStore::new();
        kv.set(WIFI_NAMESPACE, "ssid", "home").unwrap();
        kv.set(WIFI_NAMESPACE, "pass", "").unwrap();
        assert_eq!(ConfigStore::new(kv).load_credentials(), None);
    }

    #[test]
    fn save_all_round_trips_and_commits_once() {
        let mut store = ConfigStore::new(CountingStore::default());
        let creds = NetworkCredentials::new("home", "hunter22");
        let profile = DeviceProfile {
            display_name: "Porch".into(),
            friendly_description: "Porch thermometer".into(),
            location: "Garden".into(),
        };
        store.save_all(&creds, &profile).unwrap();

        assert_eq!(store.inner().commits, 1);
        assert_eq!(store.load_credentials(), Some(creds));
        assert_eq!(store.load_profile(&identity()), profile);
    }

    #[test]
    fn clearing_credentials_keeps_profile() {
        let mut store = ConfigStore::new(MemStore::new());
        let profile = DeviceProfile {
            display_name: "Attic".into(),
            friendly_description: "Attic probe".into(),
            location: "Attic".into(),
        };
        store
            .save_all(&NetworkCredentials::new("home", "pw"), &profile)
            .unwrap();
        store.clear_credentials().unwrap();

        assert_eq!(store.load_credentials(), None);
        assert_eq!(store.load_profile(&identity()), profile);
    }

    #[test]
    fn suggested_area_only_for_custom_location() {
        let mut profile = DeviceProfile::defaults(&identity());
        assert_eq!(profile.suggested_area(), None);
        profile.location = "Kitchen".into();
        assert_eq!(profile.suggested_area(), Some("Kitchen"));
    }

    #[test]
    fn text_image_round_trips_awkward_values() {
        let mut kv = MemStore::new();
        kv.set("wifi", "ssid", "my net = 2.4G").unwrap();
        kv.set("wifi", "pass", "back\\slash\nnewline").unwrap();
        kv.set("device", "location", "  padded  ").unwrap();

        let txt = kv.to_txt();
        assert!(txt.starts_with('#'));
        assert_eq!(MemStore::from_txt(&txt), kv);
    }

    #[test]
    fn text_parser_skips_junk_lines() {
        let kv = MemStore::from_txt("# comment\n\nnot a pair\nnodot=1\nwifi.ssid=home\r\n");
        assert_eq!(kv.len(), 1);
        assert_eq!(kv.get("wifi", "ssid").unwrap(), "home");
    }

    #[test]
    fn clear_only_touches_one_namespace() {
        let mut kv = MemStore::new();
        kv.set("wifi", "ssid", "a").unwrap();
        kv.set("device", "name", "b").unwrap();
        kv.clear("wifi").unwrap();
        assert_eq!(kv.get("wifi", "ssid"), Err(StoreError::NotFound));
        assert_eq!(kv.get("device", "name").unwrap(), "b");
    }
}
