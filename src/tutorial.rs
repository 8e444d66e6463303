use crate::lang::Language;

/// First-run walkthrough, one step per user-facing action.
pub fn steps(language: Language) -> &'static [(&'static str, &'static str)] {
    match language {
        Language::En => &[
            (
                "Pick the MODAPI folder",
                "Run `forest-modman root set <dir>` with the folder that contains mods/TheForest.",
            ),
            (
                "Add a ZIP with mods",
                "Run `forest-modman import <file.zip>`. A copy is kept in the managed cache.",
            ),
            (
                "Install",
                "Run `forest-modman install <name>`. The mods/TheForest folder is replaced \
                 with the archive contents. Add --staged to keep the old files until \
                 extraction succeeds.",
            ),
            (
                "Language",
                "Run `forest-modman lang toggle` to switch between English and Polish.",
            ),
            (
                "Help",
                "Run `forest-modman help` for every command, or `forest-modman logs` when \
                 something goes wrong.",
            ),
        ],
        Language::Pl => &[
            (
                "Wybierz folder MODAPI",
                "Uruchom `forest-modman root set <folder>` z folderem zawierającym mods/TheForest.",
            ),
            (
                "Dodaj plik ZIP z modami",
                "Uruchom `forest-modman import <plik.zip>`. Kopia trafia do zarządzanego katalogu.",
            ),
            (
                "Instalacja",
                "Uruchom `forest-modman install <nazwa>`. Folder mods/TheForest zostanie \
                 zastąpiony zawartością archiwum. Dodaj --staged, aby zachować stare pliki \
                 do czasu udanego rozpakowania.",
            ),
            (
                "Język",
                "Uruchom `forest-modman lang toggle`, aby przełączyć język.",
            ),
            (
                "Pomoc",
                "Uruchom `forest-modman help`, aby zobaczyć wszystkie polecenia, lub \
                 `forest-modman logs`, gdy coś pójdzie nie tak.",
            ),
        ],
    }
}

pub fn render(language: Language) -> String {
    steps(language)
        .iter()
        .enumerate()
        .map(|(index, (title, body))| format!("{}. {title}\n   {body}", index + 1))
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_languages_have_the_same_steps() {
        assert_eq!(steps(Language::En).len(), steps(Language::Pl).len());
        assert!(render(Language::En).starts_with("1. Pick the MODAPI folder"));
    }
}
