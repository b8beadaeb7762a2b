//! Random identifiers: session codes, participant ids, admin secrets.

/// Session codes are short numeric strings, easy to read aloud or type.
const CODE_ALPHABET: [char; 10] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

/// Participant ids come from a lowercase alphanumeric alphabet.
const PARTICIPANT_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

const PARTICIPANT_ID_LENGTH: usize = 8;
const ADMIN_SECRET_LENGTH: usize = 16;

/// Generate a numeric session code of the given length.
pub fn session_code(length: usize) -> String {
    nanoid::nanoid!(length, &CODE_ALPHABET)
}

/// Generate an 8-char participant id, unique within a session after the
/// caller's collision check.
pub fn participant_id() -> String {
    nanoid::nanoid!(PARTICIPANT_ID_LENGTH, &PARTICIPANT_ALPHABET)
}

/// Generate an admin secret (URL-safe alphabet, fits in a query parameter).
pub fn admin_secret() -> String {
    nanoid::nanoid!(ADMIN_SECRET_LENGTH, &nanoid::alphabet::SAFE)
}
