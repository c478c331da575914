//! Console output helpers.

use colored::Colorize;
use std::fmt::Display;

pub fn info(message: impl Display) {
    println!("{} {}", "INFO".custom_color(colors::blue()).bold(), message);
}

pub fn ready(message: impl Display) {
    println!("{} {}", "INFO".custom_color(colors::green()).bold(), message);
}

pub fn warn(message: impl Display) {
    println!("{} {}", "WARN".custom_color(colors::yellow()).bold(), message);
}

pub fn error(message: impl Display) {
    eprintln!("{} {}", "ERROR".custom_color(colors::red()).bold(), message);
}

pub fn created(what: impl Display) {
    println!("  {} {}", "✓".green(), what);
}

/// Catppuccin Mocha color palette
pub mod colors {
    use colored::CustomColor;

    pub fn mauve() -> CustomColor {
        CustomColor::new(203, 166, 247)
    }

    pub fn lavender() -> CustomColor {
        CustomColor::new(180, 190, 254)
    }

    pub fn sky() -> CustomColor {
        CustomColor::new(137, 220, 235)
    }

    pub fn subtext() -> CustomColor {
        CustomColor::new(166, 173, 200)
    }

    pub fn green() -> CustomColor {
        CustomColor::new(166, 227, 161)
    }

    pub fn yellow() -> CustomColor {
        CustomColor::new(249, 226, 175)
    }

    pub fn red() -> CustomColor {
        CustomColor::new(243, 139, 168)
    }

    pub fn blue() -> CustomColor {
        CustomColor::new(137, 180, 250)
    }
}
