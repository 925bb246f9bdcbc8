use glam::DVec2;

use crate::{ ContactBody, ContactFeature, ObjectId, ResolveError, Side, support_correction };

/// A body held against a support instead of bouncing on it.
///
/// While the contact lasts, `correction` is added to the acceleration of the
/// corrected object so that the pair stops accelerating into each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestingContact {
    /// The pair, in the order `feature` and `normal` are expressed in
    pub pair: [ObjectId; 2],
    pub feature: ContactFeature,
    /// Unit normal pointing from the second object of the pair toward the first
    pub normal: DVec2,
    pub corrected: Side,
    pub correction: DVec2,
}

impl RestingContact {
    pub fn involves(&self, id: ObjectId) -> bool {
        self.pair.contains(&id)
    }

    pub fn corrected_object(&self) -> ObjectId {
        match self.corrected {
            Side::A => self.pair[0],
            Side::B => self.pair[1],
        }
    }

    /// Normal pointing toward the object owning the resting vertex
    pub fn toward_vertex(&self) -> DVec2 {
        match self.feature.vertex_side {
            Side::A => self.normal,
            Side::B => -self.normal,
        }
    }
}

/// What to do with two touching bodies at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ContactVerdict {
    /// Approaching too fast to rest: bounce
    Impact,
    /// Held together, with the correction to apply if any body can take it
    Rest(Option<(Side, DVec2)>),
    Separate,
}

/// Classifies a contact along `normal` (from B toward A).
///
/// The pair rests when it presses into the contact and the bounce it would
/// make is shorter than `threshold` seconds.
pub(crate) fn classify_contact(
    a: ContactBody,
    b: ContactBody,
    normal: DVec2,
    threshold: f64,
    tolerance: f64,
) -> Result<ContactVerdict, ResolveError> {
    let normal = normal.try_normalize().ok_or(ResolveError::DegenerateContact(normal))?;
    let normal_speed = (a.velocity - b.velocity).dot(normal);
    let normal_accel = (a.acceleration - b.acceleration).dot(normal);

    // Highest take-off speed for which the flight lasts less than threshold
    let band = if normal_accel < 0. { -normal_accel * threshold / 2. } else { 0. };

    if normal_accel < 0. && normal_speed.abs() <= band + tolerance {
        Ok(ContactVerdict::Rest(support_correction(a, b, normal)?))
    }
    else if normal_speed < -tolerance {
        Ok(ContactVerdict::Impact)
    }
    else {
        Ok(ContactVerdict::Separate)
    }
}
