//! The viewport transform and coordinate conversions.
//!
//! "Client" coordinates are those of the drawing surface (the root `svg`);
//! "local" coordinates are the paper's model space, the user space of the
//! viewport group.

use log::debug;

use tessera_core::{
    geometry::{Matrix, Point, Rect},
    identifier::Id,
};

use crate::{error::TesseraError, paper::Paper};

/// Smallest scale factor the viewport accepts.
const MIN_SCALE: f64 = 1e-6;

impl Paper {
    /// The local-to-client transform.
    pub fn matrix(&self) -> Matrix {
        self.viewport
    }

    /// Replaces the viewport transform.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidAttribute`] for a singular matrix.
    pub fn set_matrix(&mut self, matrix: Matrix) -> Result<(), TesseraError> {
        if matrix.inverse().is_none() {
            return Err(TesseraError::invalid_attribute(
                "matrix",
                "the viewport transform must be invertible",
            ));
        }
        self.viewport = matrix;
        let node = self.layers.viewport();
        if matrix.is_identity() {
            self.scene.remove_attribute(node, "transform")?;
        } else {
            self.scene
                .set_attribute(node, "transform", matrix.to_transform_string())?;
        }
        debug!(transform = matrix.to_transform_string(); "Viewport changed");
        Ok(())
    }

    /// Current scale factors.
    pub fn scale(&self) -> (f64, f64) {
        (self.viewport.a(), self.viewport.d())
    }

    /// Sets the scale, keeping the translation.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidAttribute`] for non-positive factors.
    pub fn set_scale(&mut self, sx: f64, sy: f64) -> Result<(), TesseraError> {
        if !valid_scale(sx) || !valid_scale(sy) {
            return Err(TesseraError::invalid_attribute(
                "scale",
                format!("scale ({sx}, {sy}) must be positive"),
            ));
        }
        let m = self.viewport;
        self.set_matrix(Matrix::new(sx, m.b(), m.c(), sy, m.e(), m.f()))
    }

    /// Current translation.
    pub fn translation(&self) -> Point {
        self.viewport.translation()
    }

    /// Sets the translation, keeping the scale.
    ///
    /// # Errors
    ///
    /// Propagates scene errors.
    pub fn set_translate(&mut self, tx: f64, ty: f64) -> Result<(), TesseraError> {
        let m = self.viewport;
        self.set_matrix(Matrix::new(m.a(), m.b(), m.c(), m.d(), tx, ty))
    }

    /// Scales uniformly so that the local point `p` keeps its client
    /// position.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidAttribute`] for a non-positive scale.
    pub fn scale_uniform_at_point(&mut self, scale: f64, p: Point) -> Result<(), TesseraError> {
        if !valid_scale(scale) {
            return Err(TesseraError::invalid_attribute(
                "scale",
                format!("scale {scale} must be positive"),
            ));
        }
        let m = self.viewport;
        let (sx, sy) = (m.a(), m.d());
        let tx = m.e() - p.x() * (scale - sx);
        let ty = m.f() - p.y() * (scale - sy);
        self.set_matrix(Matrix::new(scale, 0.0, 0.0, scale, tx, ty))
    }

    pub fn client_to_local_point(&self, p: Point) -> Point {
        match self.viewport.inverse() {
            Some(inverse) => inverse.apply(p),
            None => p,
        }
    }

    pub fn client_to_local_rect(&self, rect: &Rect) -> Rect {
        match self.viewport.inverse() {
            Some(inverse) => inverse.apply_rect(rect),
            None => *rect,
        }
    }

    pub fn local_to_client_point(&self, p: Point) -> Point {
        self.viewport.apply(p)
    }

    pub fn local_to_client_rect(&self, rect: &Rect) -> Rect {
        self.viewport.apply_rect(rect)
    }

    /// Converts a local point into the coordinate system of a cell's view
    /// root (for elements, relative to the unrotated top-left corner).
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::UnknownCell`] when the cell has no view.
    pub fn local_to_cell_point(&self, id: impl Into<Id>, p: Point) -> Result<Point, TesseraError> {
        let matrix = self.cell_matrix(id.into())?;
        Ok(matrix.inverse().map_or(p, |inverse| inverse.apply(p)))
    }

    /// Converts a point of a cell's view coordinate system to local
    /// coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::UnknownCell`] when the cell has no view.
    pub fn cell_to_local_point(&self, id: impl Into<Id>, p: Point) -> Result<Point, TesseraError> {
        Ok(self.cell_matrix(id.into())?.apply(p))
    }

    fn cell_matrix(&self, id: Id) -> Result<Matrix, TesseraError> {
        let view = self.views.get(&id).ok_or(TesseraError::UnknownCell(id))?;
        Ok(self.scene.transform_to(view.root(), self.layers.viewport()))
    }
}

fn valid_scale(scale: f64) -> bool {
    scale.is_finite() && scale >= MIN_SCALE
}
