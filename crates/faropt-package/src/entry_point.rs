use std::path::Path;

/// The main script the remote runner looks for at the root of an unpacked archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Julia,
    Python,
}

impl EntryPoint {
    /// In the order the runner checks them.
    pub const ALL: [EntryPoint; 2] = [EntryPoint::Julia, EntryPoint::Python];

    pub fn file_name(&self) -> &'static str {
        match self {
            EntryPoint::Julia => "main.jl",
            EntryPoint::Python => "main.py",
        }
    }

    /// Find the entry point among archive-relative paths.
    pub fn detect<'a>(paths: impl IntoIterator<Item = &'a str> + Clone) -> Option<EntryPoint> {
        Self::ALL
            .into_iter()
            .find(|entry| paths.clone().into_iter().any(|p| p == entry.file_name()))
    }

    /// Find the entry point at the root of a directory on disk.
    pub fn detect_in_dir(dir: &Path) -> Option<EntryPoint> {
        Self::ALL
            .into_iter()
            .find(|entry| dir.join(entry.file_name()).is_file())
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["main.py", "model.py"], Some(EntryPoint::Python))]
    #[case(&["main.jl"], Some(EntryPoint::Julia))]
    #[case(&["main.py", "main.jl"], Some(EntryPoint::Julia))]
    #[case(&["src/main.py"], None)]
    #[case(&[], None)]
    fn detects_root_entry_point(#[case] paths: &[&str], #[case] expected: Option<EntryPoint>) {
        assert_eq!(EntryPoint::detect(paths.iter().copied()), expected);
    }
}
