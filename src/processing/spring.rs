//! Damped spring used to ease rendered cursors toward their replayed position

use crate::config::SpringConfig;

/// One axis of a spring: position and velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringAxis {
    pub position: f64,
    pub velocity: f64,
}

impl SpringAxis {
    pub fn at_rest(position: f64) -> Self {
        Self {
            position,
            velocity: 0.0,
        }
    }

    /// Semi-implicit Euler step of `F = -k * x - c * v` over `dt` seconds
    pub fn step(&mut self, target: f64, config: &SpringConfig, dt: f64) {
        let displacement = self.position - target;
        let force = -config.stiffness * displacement - config.damping * self.velocity;
        self.velocity += force / config.mass * dt;
        self.position += self.velocity * dt;
    }

    pub fn is_settled(&self, target: f64, threshold: f64) -> bool {
        (self.position - target).abs() < threshold && self.velocity.abs() < threshold
    }
}

/// Spring over both screen axes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring2D {
    pub x: SpringAxis,
    pub y: SpringAxis,
}

impl Spring2D {
    pub fn at_rest(x: f64, y: f64) -> Self {
        Self {
            x: SpringAxis::at_rest(x),
            y: SpringAxis::at_rest(y),
        }
    }

    pub fn step(&mut self, target: (f64, f64), config: &SpringConfig, dt: f64) {
        self.x.step(target.0, config, dt);
        self.y.step(target.1, config, dt);
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x.position, self.y.position)
    }

    /// Jump to a position and drop all momentum
    pub fn snap(&mut self, x: f64, y: f64) {
        *self = Self::at_rest(x, y);
    }

    pub fn is_settled(&self, target: (f64, f64), threshold: f64) -> bool {
        self.x.is_settled(target.0, threshold) && self.y.is_settled(target.1, threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_approaches_target() {
        let config = SpringConfig::default();
        let mut axis = SpringAxis::at_rest(0.0);
        for _ in 0..60 {
            axis.step(100.0, &config, 1.0 / 60.0);
        }
        assert!(
            (axis.position - 100.0).abs() < 5.0,
            "Position {} should be close to 100",
            axis.position
        );
    }

    #[test]
    fn test_heavily_damped_spring_barely_overshoots() {
        let config = SpringConfig {
            damping: 150.0,
            ..SpringConfig::default()
        };
        let mut axis = SpringAxis::at_rest(0.0);
        let mut max_pos = 0.0f64;
        for _ in 0..120 {
            axis.step(100.0, &config, 1.0 / 60.0);
            max_pos = max_pos.max(axis.position);
        }
        assert!(max_pos < 105.0, "Max position {} overshoots", max_pos);
    }

    #[test]
    fn test_snap_drops_velocity() {
        let config = SpringConfig::default();
        let mut spring = Spring2D::at_rest(0.0, 0.0);
        for _ in 0..10 {
            spring.step((100.0, 100.0), &config, 1.0 / 60.0);
        }
        assert!(spring.x.velocity != 0.0);

        spring.snap(500.0, 400.0);
        assert_eq!(spring.position(), (500.0, 400.0));
        assert!(spring.is_settled((500.0, 400.0), 0.01));
    }
}
