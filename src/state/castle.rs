//! Castle value objects.
//!
//! Every participant owns one castle: a tower, a wall, and a fixed set of
//! named resources. Structure health is clamped to `0..=max_health` on every
//! mutation, so no reachable state can hold an out-of-range value.

use serde::{Deserialize, Serialize};

/// Default starting tower health.
pub const DEFAULT_TOWER_HEALTH: u32 = 25;

/// Default tower health that wins the match when reached.
pub const DEFAULT_TOWER_MAX_HEALTH: u32 = 50;

/// Default starting wall health.
pub const DEFAULT_WALL_HEALTH: u32 = 10;

/// Default wall cap.
pub const DEFAULT_WALL_MAX_HEALTH: u32 = 50;

/// Resource names in display order.
pub const DEFAULT_RESOURCES: [&str; 3] = ["bricks", "gems", "recruits"];

/// A named economic counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: u32,
    pub income: u32,
}

impl Resource {
    pub fn new(name: impl Into<String>, value: u32, income: u32) -> Self {
        Self {
            name: name.into(),
            value,
            income,
        }
    }

    pub fn add(&mut self, amount: u32) {
        self.value = self.value.saturating_add(amount);
    }

    /// Remove up to `amount`, stopping at zero.
    pub fn remove(&mut self, amount: u32) {
        self.value = self.value.saturating_sub(amount);
    }

    pub fn add_income(&mut self, amount: u32) {
        self.income = self.income.saturating_add(amount);
    }

    pub fn remove_income(&mut self, amount: u32) {
        self.income = self.income.saturating_sub(amount);
    }

    /// Economy tick: value grows by income.
    pub fn tick(&mut self) {
        self.add(self.income);
    }
}

/// A health pool with a hard cap (tower or wall).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    health: u32,
    max_health: u32,
}

impl Structure {
    /// Create a structure. Starting health above the cap is clamped.
    pub fn new(health: u32, max_health: u32) -> Self {
        Self {
            health: health.min(max_health),
            max_health,
        }
    }

    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn max_health(&self) -> u32 {
        self.max_health
    }

    /// Apply damage, returning how much was actually absorbed.
    pub fn damage(&mut self, amount: u32) -> u32 {
        let absorbed = amount.min(self.health);
        self.health -= absorbed;
        absorbed
    }

    pub fn heal(&mut self, amount: u32) {
        self.health = self.health.saturating_add(amount).min(self.max_health);
    }

    pub fn is_destroyed(&self) -> bool {
        self.health == 0
    }

    pub fn is_full(&self) -> bool {
        self.health >= self.max_health
    }
}

/// Starting values for a castle, taken from battle configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastleConfig {
    pub tower_health: u32,
    pub tower_max_health: u32,
    pub wall_health: u32,
    pub wall_max_health: u32,
    /// `(name, value, income)` in display order
    pub resources: Vec<(String, u32, u32)>,
}

impl Default for CastleConfig {
    fn default() -> Self {
        Self {
            tower_health: DEFAULT_TOWER_HEALTH,
            tower_max_health: DEFAULT_TOWER_MAX_HEALTH,
            wall_health: DEFAULT_WALL_HEALTH,
            wall_max_health: DEFAULT_WALL_MAX_HEALTH,
            resources: DEFAULT_RESOURCES
                .iter()
                .map(|name| (name.to_string(), 5, 2))
                .collect(),
        }
    }
}

/// One participant's tower, wall and resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Castle {
    pub tower: Structure,
    pub wall: Structure,
    resources: Vec<Resource>,
}

impl Default for Castle {
    fn default() -> Self {
        Self::from_config(&CastleConfig::default())
    }
}

impl Castle {
    /// Build a castle. Duplicate resource names keep only the first entry.
    pub fn from_config(config: &CastleConfig) -> Self {
        let mut resources: Vec<Resource> = Vec::with_capacity(config.resources.len());
        for (name, value, income) in &config.resources {
            if resources.iter().any(|r| &r.name == name) {
                continue;
            }
            resources.push(Resource::new(name.clone(), *value, *income));
        }

        Self {
            tower: Structure::new(config.tower_health, config.tower_max_health),
            wall: Structure::new(config.wall_health, config.wall_max_health),
            resources,
        }
    }

    /// Get a resource by name.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Get a mutable resource by name.
    pub fn resource_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.iter_mut().find(|r| r.name == name)
    }

    /// Resources in display order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Economy tick for every resource.
    pub fn collect_income(&mut self) {
        for resource in &mut self.resources {
            resource.tick();
        }
    }

    /// Attack damage: the wall soaks first, the rest hits the tower.
    pub fn apply_damage(&mut self, amount: u32) {
        let absorbed = self.wall.damage(amount);
        self.tower.damage(amount - absorbed);
    }

    /// Fatigue damage: hits the wall if it still stands, otherwise the
    /// tower. Excess never spills over.
    pub fn apply_fatigue(&mut self, amount: u32) {
        if self.wall.health() > 0 {
            self.wall.damage(amount);
        } else {
            self.tower.damage(amount);
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let resources: Vec<serde_json::Value> = self
            .resources
            .iter()
            .map(|r| serde_json::json!({"name": r.name, "value": r.value, "income": r.income}))
            .collect();

        serde_json::json!({
            "tower": {"health": self.tower.health(), "max_health": self.tower.max_health()},
            "wall": {"health": self.wall.health(), "max_health": self.wall.max_health()},
            "resources": resources
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_structure_clamps() {
        let mut tower = Structure::new(10, 20);

        assert_eq!(tower.damage(15), 10);
        assert_eq!(tower.health(), 0);
        assert!(tower.is_destroyed());

        tower.heal(100);
        assert_eq!(tower.health(), 20);
        assert!(tower.is_full());
    }

    #[test]
    fn test_structure_new_clamps_start() {
        let wall = Structure::new(80, 50);
        assert_eq!(wall.health(), 50);
    }

    #[test]
    fn test_resource_income_tick() {
        let mut bricks = Resource::new("bricks", 5, 2);
        bricks.tick();
        assert_eq!(bricks.value, 7);

        bricks.remove(100);
        assert_eq!(bricks.value, 0);

        bricks.remove_income(5);
        assert_eq!(bricks.income, 0);
    }

    #[test]
    fn test_castle_damage_overflow() {
        let mut castle = Castle::default();
        castle.apply_damage(DEFAULT_WALL_HEALTH + 5);

        assert_eq!(castle.wall.health(), 0);
        assert_eq!(castle.tower.health(), DEFAULT_TOWER_HEALTH - 5);
    }

    #[test]
    fn test_castle_fatigue_no_spill() {
        let mut castle = Castle::default();
        castle.apply_fatigue(DEFAULT_WALL_HEALTH + 5);

        assert_eq!(castle.wall.health(), 0);
        assert_eq!(castle.tower.health(), DEFAULT_TOWER_HEALTH);

        castle.apply_fatigue(3);
        assert_eq!(castle.tower.health(), DEFAULT_TOWER_HEALTH - 3);
    }

    #[test]
    fn test_castle_resources_unique_ordered() {
        let config = CastleConfig {
            resources: vec![
                ("gems".to_string(), 1, 1),
                ("bricks".to_string(), 2, 2),
                ("gems".to_string(), 9, 9),
            ],
            ..CastleConfig::default()
        };
        let castle = Castle::from_config(&config);

        let names: Vec<&str> = castle.resources().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["gems", "bricks"]);
        assert_eq!(castle.resource("gems").unwrap().value, 1);
    }

    #[test]
    fn test_collect_income() {
        let mut castle = Castle::default();
        castle.collect_income();

        for resource in castle.resources() {
            assert_eq!(resource.value, 7);
        }
    }
}
