/// Named blob persistence for trained models. Names are `/`-separated,
/// e.g. `models/v3/gem_classifier` or `active`.
pub trait ModelStore: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, String>;
    fn save(&self, name: &str, blob: &[u8]) -> Result<(), String>;
}
