// Help
mod info;

// Course tracking and listings
mod courses;

// Piazza forum
mod forum;
