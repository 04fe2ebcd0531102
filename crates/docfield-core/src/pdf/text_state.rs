//! Graphics and text state tracked while walking a content stream.

/// Affine matrix `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }

    /// Length of the transformed unit y vector.
    pub fn vertical_scale(&self) -> f64 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Text state parameters plus the current matrices.
#[derive(Debug, Clone)]
pub(crate) struct TextState {
    pub ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    /// Text matrix (Tm).
    pub matrix: Matrix,
    /// Text line matrix (Tlm).
    line_matrix: Matrix,
    /// Font resource name selected with Tf.
    pub font: Vec<u8>,
    pub font_size: f64,
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// Horizontal scaling as a factor (Tz / 100).
    pub horizontal_scaling: f64,
    pub leading: f64,
    pub rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font: Vec::new(),
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

impl TextState {
    pub fn save(&mut self) {
        self.ctm_stack.push(self.ctm);
    }

    pub fn restore(&mut self) {
        if let Some(ctm) = self.ctm_stack.pop() {
            self.ctm = ctm;
        }
    }

    /// `cm`: prepend a matrix to the CTM.
    pub fn concat(&mut self, m: Matrix) {
        self.ctm = m.then(&self.ctm);
    }

    /// `BT`: reset text and line matrices.
    pub fn begin_text(&mut self) {
        self.matrix = Matrix::IDENTITY;
        self.line_matrix = Matrix::IDENTITY;
    }

    /// `Tm`.
    pub fn set_matrix(&mut self, m: Matrix) {
        self.matrix = m;
        self.line_matrix = m;
    }

    /// `Td`.
    pub fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translation(tx, ty).then(&self.line_matrix);
        self.matrix = self.line_matrix;
    }

    /// `T*`.
    pub fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    /// Move the text position along the baseline by `tx` text space units.
    pub fn advance(&mut self, tx: f64) {
        self.matrix = Matrix::translation(tx, 0.0).then(&self.matrix);
    }

    /// Horizontal displacement of a glyph with width `w0` (in 1/1000 em).
    pub fn glyph_advance(&self, w0: f64, is_space: bool) -> f64 {
        let spacing = self.char_spacing + if is_space { self.word_spacing } else { 0.0 };
        (w0 / 1000.0 * self.font_size + spacing) * self.horizontal_scaling
    }

    /// Displacement for a `TJ` array number.
    pub fn kerning_advance(&self, adjustment: f64) -> f64 {
        -adjustment / 1000.0 * self.font_size * self.horizontal_scaling
    }

    /// Text space to device space.
    fn text_to_device(&self) -> Matrix {
        self.matrix.then(&self.ctm)
    }

    /// Device position of the current glyph origin (including rise).
    pub fn origin(&self) -> (f64, f64) {
        self.text_to_device().transform_point(0.0, self.rise)
    }

    /// Device position after advancing `tx` along the baseline.
    pub fn point_along(&self, tx: f64) -> (f64, f64) {
        self.text_to_device().transform_point(tx, self.rise)
    }

    /// Rendered font size in device units.
    pub fn rendered_size(&self) -> f64 {
        (self.font_size * self.text_to_device().vertical_scale()).abs()
    }
}
