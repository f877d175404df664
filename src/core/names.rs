//! Display Names
//!
//! Deterministic "Colour Animal" names derived from a peer identity, so a
//! client that reconnects with the same token keeps the same name.

use sha2::{Digest, Sha256};

use super::peer::PeerId;

const COLORS: &[&str] = &[
    "Amber", "Aqua", "Azure", "Beige", "Black", "Blue", "Bronze", "Brown", "Coral", "Crimson",
    "Cyan", "Gold", "Gray", "Green", "Indigo", "Ivory", "Jade", "Lavender", "Lime", "Magenta",
    "Maroon", "Mint", "Navy", "Olive", "Orange", "Peach", "Pink", "Plum", "Purple", "Red",
    "Rose", "Ruby", "Salmon", "Sapphire", "Silver", "Tan", "Teal", "Turquoise", "Violet",
    "White", "Yellow",
];

const ANIMALS: &[&str] = &[
    "Albatross", "Alpaca", "Badger", "Bat", "Bear", "Beaver", "Bison", "Camel", "Cat",
    "Cheetah", "Crane", "Crow", "Deer", "Dolphin", "Eagle", "Falcon", "Ferret", "Fox", "Frog",
    "Gazelle", "Gecko", "Giraffe", "Heron", "Hedgehog", "Ibis", "Jaguar", "Koala", "Lemur",
    "Lion", "Lynx", "Moose", "Newt", "Otter", "Owl", "Panda", "Parrot", "Penguin", "Puffin",
    "Rabbit", "Raven", "Salamander", "Seal", "Sparrow", "Squirrel", "Swan", "Tiger", "Turtle",
    "Walrus", "Wolf", "Wombat", "Zebra",
];

/// Derive the display name for a peer.
pub fn display_name_for(id: &PeerId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"lan-relay-display-name:");
    hasher.update(id.as_str().as_bytes());
    let hash = hasher.finalize();

    let color = pick(COLORS, &hash[0..8]);
    let animal = pick(ANIMALS, &hash[8..16]);
    format!("{} {}", color, animal)
}

fn pick<'a>(words: &[&'a str], seed: &[u8]) -> &'a str {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(seed);
    let index = u64::from_le_bytes(bytes) % words.len() as u64;
    words[index as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_id_same_name() {
        let id = PeerId::from("67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert_eq!(display_name_for(&id), display_name_for(&id.clone()));
    }

    #[test]
    fn test_name_is_colour_then_animal() {
        let name = display_name_for(&PeerId::generate());
        let mut parts = name.split(' ');
        let color = parts.next().unwrap();
        let animal = parts.next().unwrap();

        assert!(parts.next().is_none());
        assert!(COLORS.contains(&color));
        assert!(ANIMALS.contains(&animal));
    }

    #[test]
    fn test_names_vary_across_ids() {
        let names: std::collections::BTreeSet<String> =
            (0..32).map(|_| display_name_for(&PeerId::generate())).collect();
        assert!(names.len() > 1);
    }
}
