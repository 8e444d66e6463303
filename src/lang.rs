#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Pl,
}

impl Language {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Language::En),
            "pl" => Some(Language::Pl),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Pl => "pl",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Language::En => Language::Pl,
            Language::Pl => Language::En,
        }
    }

    /// Label offered for switching away from `self`.
    pub fn switch_label(self) -> &'static str {
        match self {
            Language::En => "polski",
            Language::Pl => "english",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    AppTitle,
    RootSaved,
    InvalidRoot,
    SelectRootFirst,
    ArchiveAdded,
    ArchiveRemoved,
    NoArchives,
    InstallSucceeded,
    ModsFolderMissing,
    Error,
    UpdateAvailable,
    UpToDate,
    LanguageChanged,
    RootCleared,
    RootValid,
    RootInvalid,
    InstalledFiles,
    InstallSummary,
    TutorialReset,
    UpdateSkipped,
}

pub fn text(language: Language, message: Message) -> &'static str {
    use Message::*;
    match language {
        Language::En => match message {
            AppTitle => "The Forest Mod Manager",
            RootSaved => "✓ MODAPI folder: {folder}",
            InvalidRoot => "Invalid folder! Select the MODAPI main folder.",
            SelectRootFirst => "Select MODAPI folder first!",
            ArchiveAdded => "✓ ZIP file has been added: {name}",
            ArchiveRemoved => "Removed {name}",
            NoArchives => "No imported ZIP files yet.",
            InstallSucceeded => "✓ Mods installed successfully!",
            ModsFolderMissing => "Folder mods/TheForest does not exist!",
            Error => "Error: {error}",
            UpdateAvailable => "Update to {version} available!",
            UpToDate => "You are running the newest version.",
            LanguageChanged => "Language set to English.",
            RootCleared => "MODAPI folder cleared.",
            RootValid => "valid",
            RootInvalid => "invalid",
            InstalledFiles => "Installed files: {count}",
            InstallSummary => "  {files} file(s) written to {folder}, {removed} old entries removed",
            TutorialReset => "Tutorial will be shown on next start.",
            UpdateSkipped => "Checked within the last day; use --force to check again.",
        },
        Language::Pl => match message {
            AppTitle => "Menedżer modów The Forest",
            RootSaved => "✓ Folder MODAPI: {folder}",
            InvalidRoot => "Nieprawidłowy folder! Wybierz główny folder MODAPI.",
            SelectRootFirst => "Najpierw wybierz folder MODAPI!",
            ArchiveAdded => "✓ Plik ZIP został dodany: {name}",
            ArchiveRemoved => "Usunięto {name}",
            NoArchives => "Brak zaimportowanych plików ZIP.",
            InstallSucceeded => "✓ Mody zainstalowane pomyślnie!",
            ModsFolderMissing => "Folder mods/TheForest nie istnieje!",
            Error => "Błąd: {error}",
            UpdateAvailable => "Dostępna aktualizacja do {version}!",
            UpToDate => "Masz najnowszą wersję.",
            LanguageChanged => "Ustawiono język polski.",
            RootCleared => "Zapomniano folder MODAPI.",
            RootValid => "prawidłowy",
            RootInvalid => "nieprawidłowy",
            InstalledFiles => "Zainstalowane pliki: {count}",
            InstallSummary => "  Zapisano plików: {files} w {folder}, usunięto starych wpisów: {removed}",
            TutorialReset => "Samouczek zostanie pokazany przy następnym uruchomieniu.",
            UpdateSkipped => "Sprawdzono w ciągu ostatniej doby; użyj --force, aby sprawdzić ponownie.",
        },
    }
}

/// Looks up `message` and substitutes `{key}` placeholders.
pub fn format(language: Language, message: Message, args: &[(&str, &str)]) -> String {
    let mut out = text(language, message).to_string();
    for (key, value) in args {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
