mod emitter;
