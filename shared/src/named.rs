/// A type with a stable human-readable name, used in logs and checksum steps
pub trait Named {
    fn name(&self) -> &'static str;
}
